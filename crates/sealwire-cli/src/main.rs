//! sealwire: chunked AEAD stream encryption CLI
//!
//! Commands:
//!   keygen              - generate a random key file
//!   encrypt             - encrypt a file or stdin into a sealwire stream
//!   decrypt             - decrypt a sealwire stream, failing on any tampering or truncation
//!   config show         - display current configuration

use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use clap::{Args, Parser, Subcommand};
use rand::RngCore;
use secrecy::SecretString;
use tracing::info;

use sealwire_core::{CipherSuite, LogFormat, SealError, SealwireConfig};
use sealwire_crypto::{derive_key, os_random, CipherKey, KdfParams, SALT_SIZE};
use sealwire_stream::{decrypt_from, encrypt_to};

// ── CLI structure ──────────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(
    name = "sealwire",
    version,
    about = "Tamper-evident chunked stream encryption",
    long_about = "sealwire: encrypt and decrypt byte streams as length-prefixed, counter-tagged AEAD chunks"
)]
struct Cli {
    /// Path to sealwire.toml configuration file
    #[arg(long, short = 'c', env = "SEALWIRE_CONFIG", default_value = "sealwire.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Generate a random key and write it base64-encoded
    Keygen {
        /// Cipher suite (default: [cipher] suite from config)
        #[arg(long, short = 's')]
        suite: Option<CipherSuite>,
        /// Key file to create (default: stdout)
        #[arg(long, short = 'o')]
        output: Option<PathBuf>,
    },

    /// Encrypt a file (or stdin) into a sealwire stream
    Encrypt {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Decrypt a sealwire stream
    ///
    /// Exits non-zero, removing the output file, unless the stream ends with
    /// an authenticated terminator.
    Decrypt {
        #[command(flatten)]
        io: IoArgs,
        #[command(flatten)]
        key: KeyArgs,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Print the active configuration (merged defaults + config file)
    Show,
}

#[derive(Args, Debug)]
struct IoArgs {
    /// Input file (default: stdin)
    #[arg(long, short = 'i')]
    input: Option<PathBuf>,
    /// Output file (default: stdout)
    #[arg(long, short = 'o')]
    output: Option<PathBuf>,
}

#[derive(Args, Debug)]
#[group(required = true, multiple = false)]
struct KeyArgs {
    /// Key file written by `sealwire keygen`
    #[arg(long, short = 'k')]
    key_file: Option<PathBuf>,
    /// Derive the key from a password (SEALWIRE_PASSWORD, or prompted)
    #[arg(long)]
    password: bool,
}

/// Where the stream key comes from.
enum KeySource {
    Key(CipherKey),
    /// Argon2id over a random salt stored in front of the stream.
    Password(SecretString),
}

// ── Entry point ───────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = SealwireConfig::load(&cli.config)?;
    init_logging(&config.log.level, &config.log.format);

    match cli.command {
        Commands::Keygen { suite, output } => {
            cmd_keygen(suite.unwrap_or(config.cipher.suite), output.as_deref())
        }
        Commands::Encrypt { io, key } => cmd_encrypt(&config, &io, &key),
        Commands::Decrypt { io, key } => cmd_decrypt(&config, &io, &key),
        Commands::Config { action: ConfigAction::Show } => cmd_config_show(&config, &cli.config),
    }
}

/// Logs go to stderr: stdout may carry the stream itself.
fn init_logging(level: &str, format: &LogFormat) {
    use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    match format {
        LogFormat::Json => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().json().with_writer(io::stderr))
                .init();
        }
        LogFormat::Text => {
            tracing_subscriber::registry()
                .with(filter)
                .with(fmt::layer().with_writer(io::stderr))
                .init();
        }
    }
}

// ── `sealwire keygen` ─────────────────────────────────────────────────────────

fn cmd_keygen(suite: CipherSuite, output: Option<&Path>) -> Result<()> {
    let key = CipherKey::generate(suite, &mut os_random()).context("generating key")?;
    let encoded = encode_key(&key);

    match output {
        Some(path) => {
            write_private(path, encoded.as_bytes())
                .with_context(|| format!("writing key file: {}", path.display()))?;
            info!(suite = %suite, path = %path.display(), "key written");
        }
        None => println!("{encoded}"),
    }
    Ok(())
}

/// Key file body: `<suite>:<base64 key>`.
fn encode_key(key: &CipherKey) -> String {
    format!("{}:{}", key.suite(), STANDARD.encode(key.as_bytes()))
}

fn decode_key(text: &str) -> Result<CipherKey> {
    let (suite, encoded) = text
        .trim()
        .split_once(':')
        .context("key file must look like <suite>:<base64>")?;
    let suite: CipherSuite = suite.parse().map_err(anyhow::Error::msg)?;
    let bytes = STANDARD
        .decode(encoded)
        .context("key file is not valid base64")?;
    Ok(CipherKey::from_bytes(suite, &bytes)?)
}

fn read_key_file(path: &Path) -> Result<CipherKey> {
    let text = fs::read_to_string(path)
        .with_context(|| format!("reading key file: {}", path.display()))?;
    decode_key(&text).with_context(|| format!("loading key file: {}", path.display()))
}

#[cfg(unix)]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    use std::os::unix::fs::OpenOptionsExt;

    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .mode(0o600)
        .open(path)?;
    file.write_all(contents)?;
    file.write_all(b"\n")
}

#[cfg(not(unix))]
fn write_private(path: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = fs::OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)?;
    file.write_all(contents)?;
    file.write_all(b"\n")
}

fn key_source(args: &KeyArgs) -> Result<KeySource> {
    if let Some(path) = &args.key_file {
        return Ok(KeySource::Key(read_key_file(path)?));
    }
    let password = match std::env::var("SEALWIRE_PASSWORD") {
        Ok(password) => password,
        Err(_) => rpassword::prompt_password("Password: ").context("reading password")?,
    };
    if password.is_empty() {
        anyhow::bail!("empty password");
    }
    Ok(KeySource::Password(SecretString::from(password)))
}

// ── `sealwire encrypt` / `sealwire decrypt` ──────────────────────────────────

fn open_input(path: Option<&Path>) -> Result<Box<dyn Read>> {
    Ok(match path {
        Some(path) => Box::new(BufReader::new(
            File::open(path).with_context(|| format!("opening input: {}", path.display()))?,
        )),
        None => Box::new(io::stdin().lock()),
    })
}

fn open_output(path: Option<&Path>) -> Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("creating output: {}", path.display()))?,
        )),
        None => Box::new(io::stdout().lock()),
    })
}

fn cmd_encrypt(config: &SealwireConfig, io_args: &IoArgs, key_args: &KeyArgs) -> Result<()> {
    let source = key_source(key_args)?;
    let mut input = open_input(io_args.input.as_deref())?;
    let mut output = open_output(io_args.output.as_deref())?;

    let bytes = seal(&mut input, &mut output, &source, config)?;
    info!(bytes, "stream encrypted");
    Ok(())
}

fn cmd_decrypt(config: &SealwireConfig, io_args: &IoArgs, key_args: &KeyArgs) -> Result<()> {
    let source = key_source(key_args)?;
    let mut input = open_input(io_args.input.as_deref())?;
    let mut output = open_output(io_args.output.as_deref())?;

    match open(&mut input, &mut output, &source, config) {
        Ok(bytes) => {
            info!(bytes, "stream decrypted and verified");
            Ok(())
        }
        Err(e) => {
            drop(output);
            if let Some(path) = &io_args.output {
                let _ = fs::remove_file(path);
            }
            Err(e)
        }
    }
}

fn password_key(
    password: &SecretString,
    salt: &[u8; SALT_SIZE],
    config: &SealwireConfig,
) -> Result<CipherKey> {
    let params = KdfParams::from(config.kdf.clone());
    derive_key(password, salt, &params, config.cipher.suite).context("deriving key from password")
}

/// Encrypt all of `input` into `output`, returning the plaintext byte count.
fn seal(
    input: &mut dyn Read,
    output: &mut dyn Write,
    source: &KeySource,
    config: &SealwireConfig,
) -> Result<u64> {
    let key = match source {
        KeySource::Key(key) => key.clone(),
        KeySource::Password(password) => {
            let mut salt = [0u8; SALT_SIZE];
            os_random()
                .try_fill_bytes(&mut salt)
                .context("generating salt")?;
            output.write_all(&salt).context("writing salt")?;
            password_key(password, &salt, config)?
        }
    };

    let mut enc = encrypt_to(output, &key, &config.stream)?;
    let bytes = io::copy(input, &mut enc).context("encrypting stream")?;
    enc.close().context("finishing stream")?;
    Ok(bytes)
}

/// Decrypt all of `input` into `output`. Succeeds only if the terminator was
/// authenticated.
fn open(
    input: &mut dyn Read,
    output: &mut dyn Write,
    source: &KeySource,
    config: &SealwireConfig,
) -> Result<u64> {
    let key = match source {
        KeySource::Key(key) => key.clone(),
        KeySource::Password(password) => {
            let mut salt = [0u8; SALT_SIZE];
            input.read_exact(&mut salt).context("reading salt")?;
            password_key(password, &salt, config)?
        }
    };

    let mut dec = decrypt_from(input, &key, &config.stream)?;
    let bytes = io::copy(&mut dec, output).map_err(describe_stream_error)?;
    dec.close().context("verifying end of stream")?;
    output.flush().context("flushing output")?;
    Ok(bytes)
}

fn describe_stream_error(err: io::Error) -> anyhow::Error {
    match SealError::from_io(&err) {
        Some(seal) if seal.is_tampering() => {
            anyhow::Error::new(seal.clone()).context("stream rejected: tampered or corrupt")
        }
        Some(seal) => anyhow::Error::new(seal.clone()).context("decrypting stream"),
        None => anyhow::Error::new(err).context("decrypting stream"),
    }
}

// ── `sealwire config show` ────────────────────────────────────────────────────

fn cmd_config_show(config: &SealwireConfig, config_path: &Path) -> Result<()> {
    if config_path.exists() {
        println!("# Configuration from: {}", config_path.display());
    } else {
        println!("# Configuration: defaults (no file at {})", config_path.display());
    }
    println!();
    let rendered = toml::to_string_pretty(config).context("serializing config to TOML")?;
    print!("{rendered}");
    Ok(())
}
