//! Command-line interface for building, signing and verifying EYP packages.
//!
//! Signing goes through the signer agent running on this machine; agent
//! settings can be given as flags or through `EYP_*` environment variables.

use clap::{Args, Parser, Subcommand};
use eyp::agent::{sign_package, SignerAgentClient};
use eyp::config::DEFAULT_AGENT_PORT;
use eyp::verify::EntryStatus;
use eyp::{
    AgentConfig, Attachment, DirectoryStore, DocumentMetadata, PackageBuilder, PackageState,
    TokenIssuer, UnsignedPackage,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "eyp")]
#[command(about = "Official document package (EYP) tool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build an unsigned package and print the digest to be signed
    Build {
        #[command(flatten)]
        package: PackageArgs,

        /// Output file (default: <document>.eyp)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Build, sign through the signer agent and seal a package
    Sign {
        #[command(flatten)]
        package: PackageArgs,

        #[command(flatten)]
        agent: AgentArgs,

        /// Text shown by the signer agent for confirmation
        #[arg(long, default_value = "Resmi yazi imzalama")]
        description: String,

        /// Output file (default: <document>.eyp)
        #[arg(short, long, conflicts_with = "store")]
        output: Option<PathBuf>,

        /// Store under <dir>/<year>/<document number>.eyp instead
        #[arg(long)]
        store: Option<PathBuf>,
    },
    /// Recompute and check every digest in a package
    Verify {
        /// Package file
        input: PathBuf,
    },
    /// Check whether the signer agent is reachable
    Probe {
        #[command(flatten)]
        agent: AgentArgs,
    },
    /// Issue a session token for diagnostics
    Token {
        #[command(flatten)]
        agent: AgentArgs,
    },
}

#[derive(Args)]
struct PackageArgs {
    /// Primary document (rendered PDF)
    #[arg(short, long)]
    document: PathBuf,

    /// Document metadata (JSON)
    #[arg(short, long)]
    metadata: PathBuf,

    /// Attachment, may be repeated
    #[arg(short, long = "attachment")]
    attachments: Vec<PathBuf>,

    /// ZIP compression level (0-9, default: 6)
    #[arg(short = 'z', long, default_value = "6")]
    zip_level: u32,
}

#[derive(Args)]
struct AgentArgs {
    /// Signer agent address (loopback only)
    #[arg(long, env = "EYP_AGENT_HOST", default_value = "127.0.0.1")]
    agent_host: String,

    /// Signer agent port
    #[arg(long, env = "EYP_AGENT_PORT", default_value_t = DEFAULT_AGENT_PORT)]
    agent_port: u16,

    /// Shared secret for session tokens
    #[arg(long, env = "EYP_AGENT_SECRET", hide_env_values = true)]
    agent_secret: String,

    /// Session token lifetime in seconds
    #[arg(long, env = "EYP_TOKEN_TTL_SECS", default_value = "300")]
    token_ttl: u64,

    /// Seconds to wait for a signature
    #[arg(long, env = "EYP_SIGN_TIMEOUT_SECS", default_value = "60")]
    sign_timeout: u64,
}

impl AgentArgs {
    fn config(&self) -> eyp::Result<AgentConfig> {
        let config = AgentConfig::new(self.agent_secret.clone())
            .host(self.agent_host.clone())
            .port(self.agent_port)
            .token_ttl(Duration::from_secs(self.token_ttl))
            .sign_timeout(Duration::from_secs(self.sign_timeout));
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode, Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Command::Build { package, output } => {
            let unsigned = build_package(&package)?;
            let output = output.unwrap_or_else(|| default_output(&package.document));
            std::fs::write(&output, unsigned.to_bytes()?)?;

            let digest = unsigned.signing_digest();
            println!("Built: {}", output.display());
            println!("Package: {}", unsigned.id());
            println!("Digest to sign (base64): {}", digest.to_base64());
            println!("Digest to sign (hex): {}", digest.to_hex());
        }
        Command::Sign {
            package,
            agent,
            description,
            output,
            store,
        } => {
            let unsigned = build_package(&package)?;
            let client = SignerAgentClient::new(agent.config()?)?;
            let signers = unsigned.metadata().signers.clone();
            let sealed = sign_package(&unsigned, &client, &description, signers).await?;

            match store {
                Some(dir) => {
                    let key = sealed.store(&DirectoryStore::new(&dir))?;
                    println!("Stored: {}", dir.join(key).display());
                }
                None => {
                    let output = output.unwrap_or_else(|| default_output(&package.document));
                    std::fs::write(&output, sealed.bytes())?;
                    println!("Signed: {}", output.display());
                }
            }
        }
        Command::Verify { input } => {
            let bytes = std::fs::read(&input)?;
            let report = eyp::check(&bytes)?;

            let state = match report.state {
                PackageState::Unsigned => "unsigned",
                PackageState::Sealed => "sealed",
            };
            println!("Package {} ({})", report.package_id, state);
            for entry in &report.entries {
                let status = match &entry.status {
                    EntryStatus::Ok => "ok".to_string(),
                    EntryStatus::Missing => "MISSING".to_string(),
                    EntryStatus::Mismatch(actual) => format!("MISMATCH {}", actual.to_hex()),
                };
                println!("  {:<10} {:<40} {}", entry.manifest.element(), entry.path, status);
            }
            if let Some(primary) = &report.primary {
                let status = if primary.is_ok() { "ok" } else { "MISMATCH" };
                println!("  {:<10} {:<40} {}", "Ustveri", primary.path, status);
            }
            for path in &report.uncovered {
                println!("  {:<10} {:<40} NOT COVERED", "NihaiOzet", path);
            }
            for path in &report.unlisted {
                println!("  {:<10} {:<40} UNLISTED", "-", path);
            }
            if let Some(info) = &report.signature_info {
                println!("Signed at {}", info.signed_at.to_rfc3339());
                for signer in &info.signers {
                    println!("  {} {}, {} ({})", signer.given_name, signer.surname, signer.title, signer.capacity);
                }
            }

            if !report.is_valid() {
                let mut problems: Vec<&str> = report.mismatched_paths();
                problems.extend(report.uncovered.iter().map(String::as_str));
                problems.extend(report.unlisted.iter().map(String::as_str));
                eprintln!("Verification failed: {}", problems.join(", "));
                return Ok(ExitCode::FAILURE);
            }
            println!("Verified");
        }
        Command::Probe { agent } => {
            let client = SignerAgentClient::new(agent.config()?)?;
            if client.probe().await {
                println!("Signer agent reachable at {}", client.config().base_url());
            } else {
                eprintln!("Signer agent offline at {}", client.config().base_url());
                return Ok(ExitCode::FAILURE);
            }
        }
        Command::Token { agent } => {
            let config = agent.config()?;
            let token = TokenIssuer::new(config.secret().clone(), config.ttl()).issue()?;
            let expires = chrono::DateTime::from_timestamp(token.claims().exp, 0)
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            println!("{}", token.as_str());
            eprintln!("Expires: {expires}");
        }
    }

    Ok(ExitCode::SUCCESS)
}

fn build_package(args: &PackageArgs) -> Result<UnsignedPackage, Box<dyn std::error::Error>> {
    let metadata: DocumentMetadata = serde_json::from_slice(&std::fs::read(&args.metadata)?)?;

    let mut builder = PackageBuilder::new()
        .primary_document(
            file_name(&args.document)?,
            mime_type(&args.document),
            std::fs::read(&args.document)?,
        )
        .metadata(metadata)
        .compression_level(args.zip_level);

    for path in &args.attachments {
        builder = builder.attachment(Attachment::new(
            file_name(path)?,
            mime_type(path),
            std::fs::read(path)?,
        ));
    }

    Ok(builder.build()?)
}

fn file_name(path: &Path) -> Result<String, Box<dyn std::error::Error>> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| format!("Invalid file name: {}", path.display()).into())
}

fn mime_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    match ext.as_str() {
        "pdf" => "application/pdf",
        "xml" => "application/xml",
        "txt" => "text/plain",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "zip" => "application/zip",
        _ => "application/octet-stream",
    }
}

fn default_output(document: &Path) -> PathBuf {
    let mut out = document.to_path_buf();
    out.set_extension("eyp");
    out
}
