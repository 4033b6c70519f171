//! `email-check <email>` — one JSON result object on stdout, diagnostics
//! on stderr, exit 1 only when the address argument is missing.

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use email_check::{ProbeOptions, SmtpVerifier, run_check};

#[derive(Parser)]
#[command(name = "email-check", version, about)]
struct Cli {
    /// adresse e-mail à vérifier
    email: Option<String>,

    /// timeout socket par hôte (ms, 0 = illimité)
    #[arg(long = "timeout", default_value_t = 5_000)]
    timeout_ms: u64,

    /// nom annoncé dans EHLO (par défaut le domaine cible)
    #[arg(long)]
    helo: Option<String>,

    /// enveloppe MAIL FROM (par défaut postmaster@domaine)
    #[arg(long = "from")]
    mail_from: Option<String>,

    /// nombre maximum d'hôtes MX interrogés
    #[arg(long = "max-mx", default_value_t = 3)]
    max_mx: usize,

    /// désactive la détection de catch-all
    #[arg(long = "no-catchall-probe")]
    no_catchall_probe: bool,

    /// autorise IPv6
    #[arg(long)]
    ipv6: bool,

    /// trace détaillée sur stderr (équivaut à RUST_LOG=email_check=trace)
    #[arg(long)]
    debug: bool,
}

impl Cli {
    fn probe_options(&self) -> ProbeOptions {
        let mut options = ProbeOptions::default();
        if let Some(helo) = &self.helo {
            options.helo_name = helo.clone();
        }
        if let Some(mail_from) = &self.mail_from {
            options.mail_from = mail_from.clone();
        }
        options.timeout_ms = self.timeout_ms;
        options.max_hosts = self.max_mx;
        options.catchall_probe = !self.no_catchall_probe;
        options.ipv6 = self.ipv6;
        options
    }
}

fn init_tracing(debug: bool) {
    let fallback = if debug {
        "email_check=trace"
    } else {
        "email_check=debug"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_tracing(cli.debug);

    let Some(email) = cli.email.as_deref() else {
        println!(
            "{}",
            serde_json::json!({ "success": false, "error": "Email argument required" })
        );
        return Ok(ExitCode::FAILURE);
    };

    debug!(email, "starting check");
    let verifier = SmtpVerifier::new(cli.probe_options());
    let result = run_check(email, &verifier);
    debug!(?result, "final result");

    println!("{}", serde_json::to_string(&result)?);
    // validity is reported through the payload, not the exit code
    Ok(ExitCode::SUCCESS)
}
