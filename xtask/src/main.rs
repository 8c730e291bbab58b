//! Build automation tasks for the rust-mongo-pool workspace.
//!
//! Run with `cargo xtask <command>`.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use xshell::{Shell, cmd};

#[derive(Parser)]
#[command(name = "xtask", about = "Build automation for rust-mongo-pool")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run all checks (format, lint, test)
    Ci,
    /// Run cargo fmt --check
    Fmt,
    /// Run clippy with all features
    Clippy,
    /// Run all tests
    Test,
    /// Run cargo-deny checks
    Deny,
    /// Generate documentation
    Doc,
    /// Run the pool suite, including the blocking and timing tests
    Pool,
    /// Run the authentication suites (SCRAM vectors, SASL, MONGODB-AWS)
    Auth,
    /// Build the fuzz targets (requires cargo-fuzz and nightly)
    Fuzz {
        /// Also run every target for this many seconds
        #[arg(long, value_name = "SECONDS")]
        smoke: Option<u32>,
    },
    /// Clean build artifacts
    Clean,
}

/// Targets declared in `fuzz/Cargo.toml`.
const FUZZ_TARGETS: [&str; 3] = ["hello_reply", "scram_server_first", "saslprep"];

fn main() -> Result<()> {
    let cli = Cli::parse();
    let sh = Shell::new()?;

    // Change to workspace root
    let workspace_root = workspace_root()?;
    sh.change_dir(&workspace_root);

    match cli.command {
        Command::Ci => {
            println!("Running CI checks...");
            fmt(&sh)?;
            clippy(&sh)?;
            test(&sh)?;
            doc(&sh)?;
            deny(&sh)?;
            println!("All CI checks passed!");
        }
        Command::Fmt => fmt(&sh)?,
        Command::Clippy => clippy(&sh)?,
        Command::Test => test(&sh)?,
        Command::Deny => deny(&sh)?,
        Command::Doc => doc(&sh)?,
        Command::Pool => pool(&sh)?,
        Command::Auth => auth(&sh)?,
        Command::Fuzz { smoke } => fuzz(&sh, smoke)?,
        Command::Clean => clean(&sh)?,
    }

    Ok(())
}

fn workspace_root() -> Result<PathBuf> {
    let output = std::process::Command::new("cargo")
        .args(["locate-project", "--workspace", "--message-format=plain"])
        .output()
        .context("failed to run cargo locate-project")?;

    let path = String::from_utf8(output.stdout)
        .context("invalid UTF-8 in cargo output")?
        .trim()
        .to_string();

    Ok(PathBuf::from(path)
        .parent()
        .context("failed to get workspace root")?
        .to_path_buf())
}

fn fmt(sh: &Shell) -> Result<()> {
    println!("Checking formatting...");
    cmd!(sh, "cargo fmt --all -- --check").run()?;
    println!("Formatting check passed.");
    Ok(())
}

fn clippy(sh: &Shell) -> Result<()> {
    println!("Running clippy...");
    cmd!(
        sh,
        "cargo clippy --workspace --all-targets -- -D warnings"
    )
    .run()?;
    println!("Clippy check passed.");
    Ok(())
}

fn test(sh: &Shell) -> Result<()> {
    println!("Running tests...");
    cmd!(sh, "cargo test --workspace").run()?;
    println!("All tests passed.");
    Ok(())
}

fn deny(sh: &Shell) -> Result<()> {
    println!("Running cargo-deny...");
    cmd!(sh, "cargo deny check").run()?;
    println!("Cargo-deny check passed.");
    Ok(())
}

fn doc(sh: &Shell) -> Result<()> {
    println!("Generating documentation...");
    cmd!(sh, "cargo doc --workspace --no-deps").env("RUSTDOCFLAGS", "-D warnings").run()?;
    println!("Documentation generated.");
    Ok(())
}

fn pool(sh: &Shell) -> Result<()> {
    println!("Running connection pool tests...");
    cmd!(sh, "cargo test -p mongo-driver-pool").run()?;
    println!("Connection pool tests passed.");
    Ok(())
}

fn auth(sh: &Shell) -> Result<()> {
    println!("Running authentication tests...");
    cmd!(sh, "cargo test -p mongo-protocol -p mongo-auth").run()?;
    println!("Authentication tests passed.");
    Ok(())
}

fn fuzz(sh: &Shell, smoke: Option<u32>) -> Result<()> {
    println!("Building fuzz targets...");
    let _dir = sh.push_dir("fuzz");
    cmd!(sh, "cargo +nightly fuzz build").run()?;
    println!("Fuzz targets built.");

    if let Some(seconds) = smoke {
        let max_time = format!("-max_total_time={seconds}");
        for target in FUZZ_TARGETS {
            println!("Fuzzing {target} for {seconds}s...");
            cmd!(sh, "cargo +nightly fuzz run {target} -- {max_time}").run()?;
        }
        println!("Fuzz smoke run found no crashes.");
    }
    Ok(())
}

fn clean(sh: &Shell) -> Result<()> {
    println!("Cleaning build artifacts...");
    cmd!(sh, "cargo clean").run()?;
    println!("Clean complete.");
    Ok(())
}
