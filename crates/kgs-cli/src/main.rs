//! kgs: kagishare container CLI
//!
//! Commands:
//!   encrypt <file>       - encrypt a file into a .kgsr container
//!   decrypt <file.kgsr>  - decrypt a container back to plaintext
//!   inspect <file.kgsr>  - print container metadata (no key material)

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use secrecy::SecretString;
use std::path::{Path, PathBuf};
use std::time::Duration;

use kgs_core::config::KgsConfig;
use kgs_crypto::kdf::KdfParams;
use kgs_crypto::{ContainerMeta, EncryptedContainer, FORMAT_VERSION, TAG_SIZE};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "kgs",
    version,
    about = "kagishare encrypted container tool",
    long_about = "kgs: encrypt, decrypt, and inspect .kgsr containers locally"
)]
struct Cli {
    /// Path to kagishare.toml configuration file
    #[arg(long, short = 'c', env = "KGS_CONFIG")]
    config: Option<PathBuf>,

    /// Log filter (e.g. info, kgs_crypto=debug)
    #[arg(long, env = "KGS_LOG", default_value = "warn")]
    log: String,

    /// Log format: "text" or "json"
    #[arg(long, default_value = "text")]
    log_format: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Encrypt a file into a .kgsr container
    Encrypt {
        /// Plaintext input file
        file: PathBuf,
        /// Output path (default: input path + .kgsr)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        /// MIME type recorded in the metadata
        #[arg(long, default_value = "application/octet-stream")]
        mime: String,
        /// Read the password from this environment variable instead of
        /// prompting
        #[arg(long, env = "KGS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Decrypt a .kgsr container
    Decrypt {
        /// Container input file
        file: PathBuf,
        /// Output path (default: original name from the metadata)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
        #[arg(long, env = "KGS_PASSWORD", hide_env_values = true)]
        password: Option<String>,
    },

    /// Print container metadata
    Inspect {
        /// Container input file
        file: PathBuf,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli.log, &cli.log_format);

    let config = match &cli.config {
        Some(path) => KgsConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => KgsConfig::default(),
    };

    match cli.command {
        Commands::Encrypt {
            file,
            output,
            mime,
            password,
        } => cmd_encrypt(&config, &file, output.as_deref(), &mime, password),
        Commands::Decrypt {
            file,
            output,
            password,
        } => cmd_decrypt(&config, &file, output.as_deref(), password),
        Commands::Inspect { file } => cmd_inspect(&file),
    }
}

fn init_tracing(filter: &str, format: &str) {
    let builder = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr);
    if format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn read_password(from_flag: Option<String>, confirm: bool) -> Result<SecretString> {
    if let Some(p) = from_flag {
        return Ok(SecretString::from(p));
    }
    let first = rpassword::prompt_password("Password: ").context("reading password")?;
    if confirm {
        let second = rpassword::prompt_password("Confirm password: ").context("reading password")?;
        if first != second {
            anyhow::bail!("passwords do not match");
        }
    }
    Ok(SecretString::from(first))
}

// ── `kgs encrypt` ──────────────────────────────────────────────────────────────

fn cmd_encrypt(
    config: &KgsConfig,
    file: &Path,
    output: Option<&Path>,
    mime: &str,
    password: Option<String>,
) -> Result<()> {
    let plaintext =
        std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let password = read_password(password, true)?;

    let pb = make_spinner("encrypt");

    pb.set_message("deriving key");
    let salt = kgs_crypto::generate_salt();
    let params = KdfParams::from(&config.kdf);
    let key = kgs_crypto::derive_file_key(&password, &salt, &params)?;

    pb.set_message("encrypting");
    let (ciphertext, nonce) = kgs_crypto::encrypt(&key, &plaintext)?;

    pb.set_message("packaging");
    let original_name = file
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| "file".to_string());
    let container = EncryptedContainer::new(
        ContainerMeta {
            version: FORMAT_VERSION.to_string(),
            salt,
            nonce,
            original_name,
            mime_type: mime.to_string(),
            plaintext_size: plaintext.len() as u64,
            encrypted_size: (plaintext.len() + TAG_SIZE) as u64,
        },
        ciphertext,
    )?;
    let bytes = kgs_crypto::encode(&container)?;

    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| file.with_extension(kgsr_extension(file)));
    std::fs::write(&out_path, &bytes)
        .with_context(|| format!("writing {}", out_path.display()))?;

    pb.finish_with_message(format!(
        "{} → {} ({} bytes)",
        file.display(),
        out_path.display(),
        bytes.len()
    ));
    Ok(())
}

fn kgsr_extension(file: &Path) -> String {
    match file.extension() {
        Some(ext) => format!("{}.kgsr", ext.to_string_lossy()),
        None => "kgsr".to_string(),
    }
}

// ── `kgs decrypt` ──────────────────────────────────────────────────────────────

fn cmd_decrypt(
    config: &KgsConfig,
    file: &Path,
    output: Option<&Path>,
    password: Option<String>,
) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let container = kgs_crypto::decode(&bytes)?;
    let password = read_password(password, false)?;

    let pb = make_spinner("decrypt");

    pb.set_message("deriving key");
    let params = KdfParams::from(&config.kdf);
    let key = kgs_crypto::derive_file_key(&password, &container.meta.salt, &params)?;

    pb.set_message("decrypting");
    let plaintext = kgs_crypto::decrypt(&key, &container.meta.nonce, &container.ciphertext)
        .map_err(|_| anyhow::anyhow!("wrong password or corrupted container"))?;

    let out_path = output
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(&container.meta.original_name));
    std::fs::write(&out_path, &plaintext)
        .with_context(|| format!("writing {}", out_path.display()))?;

    pb.finish_with_message(format!(
        "{} → {} ({} bytes)",
        file.display(),
        out_path.display(),
        plaintext.len()
    ));
    Ok(())
}

// ── `kgs inspect` ──────────────────────────────────────────────────────────────

fn cmd_inspect(file: &Path) -> Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let container = kgs_crypto::decode(&bytes)?;
    let meta = &container.meta;

    println!("container:      {}", file.display());
    println!("format version: {}", meta.version);
    println!("original name:  {}", meta.original_name);
    println!("mime type:      {}", meta.mime_type);
    println!("plaintext size: {} bytes", meta.plaintext_size);
    println!("encrypted size: {} bytes", meta.encrypted_size);
    Ok(())
}

// ── Progress helpers ───────────────────────────────────────────────────────────

fn make_spinner(prefix: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::with_template("{prefix:.bold} {spinner} {msg}").unwrap());
    pb.set_prefix(prefix.to_string());
    pb.enable_steady_tick(Duration::from_millis(80));
    pb
}
