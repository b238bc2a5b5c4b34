use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use otp_gate::secret::seed;
use otp_gate::{
    Hotp, HotpParams, Issued, LogNotifier, MemoryStore, OtpConfig, OtpService,
    Secret, SecretStrategy, Sha256Secret, Verification,
};
use tracing_subscriber::EnvFilter;

/// Command line
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    commands: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// derive the secret bound to an email and session
    Secret(SubjectArgs),
    /// compute the code for a secret and counter
    Generate(CodeArgs),
    /// check a code against a secret and counter
    Validate {
        #[command(flatten)]
        code_args: CodeArgs,
        #[arg(long, short = 'o')]
        otp: String,
    },
    /// issue a code and verify guesses against in-memory stores
    Demo {
        #[command(flatten)]
        subject: SubjectArgs,
        /// wrong guesses to submit before the real code
        #[arg(long, default_value_t = 0)]
        wrong: u32,
        #[arg(long, env = "OTP_MAX_ATTEMPTS", default_value_t = 3)]
        max_attempts: u32,
    },
}

#[derive(Args)]
struct SubjectArgs {
    #[arg(long, short)]
    email: String,
    #[arg(long, short)]
    session: String,
}

#[derive(Args)]
struct CodeArgs {
    /// base32 secret
    #[arg(long, short = 'k')]
    secret: String,
    #[arg(long, short)]
    counter: u64,
    #[arg(long, short, env = "OTP_DIGITS", default_value_t = 6)]
    digits: u32,
    /// append a Luhn check digit
    #[arg(long)]
    checksum: bool,
    #[arg(long)]
    truncation_offset: Option<usize>,
}

impl CodeArgs {
    fn hotp(&self) -> Hotp {
        Hotp::new(HotpParams {
            digits: self.digits,
            checksum: self.checksum,
            truncation_offset: self.truncation_offset,
        })
    }
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.commands {
        Commands::Secret(subject) => {
            let secret = Sha256Secret.load(&seed(&subject.email, &subject.session));
            println!("{}", secret.as_str());
        }
        Commands::Generate(args) => {
            let code = args
                .hotp()
                .generate(&Secret::new(args.secret.as_str()), args.counter)
                .context("could not generate code")?;
            println!("{code}");
        }
        Commands::Validate { code_args, otp } => {
            let valid = code_args
                .hotp()
                .validate(&otp, &Secret::new(code_args.secret.as_str()), code_args.counter)
                .context("could not validate code")?;
            println!("{}", if valid { "valid" } else { "invalid" });
            if !valid {
                std::process::exit(1);
            }
        }
        Commands::Demo {
            subject,
            wrong,
            max_attempts,
        } => demo(&subject, wrong, max_attempts)?,
    }

    Ok(())
}

fn demo(subject: &SubjectArgs, wrong: u32, max_attempts: u32) -> Result<()> {
    let config = OtpConfig {
        debug: true,
        max_attempts,
        ..OtpConfig::from_env()
    };
    let store = MemoryStore::new();
    let service = OtpService::new(&store, &store, LogNotifier, config);

    let code = match service.issue(&subject.email, &subject.session, &subject.email)? {
        Issued::Debug { code } => code,
        Issued::Dispatched => bail!("demo runs in debug mode and never dispatches"),
    };
    println!("issued {code}");

    let wrong_code = "0".repeat(code.len());
    for _ in 0..wrong {
        let guess = if wrong_code == code { "1".repeat(code.len()) } else { wrong_code.clone() };
        report(&guess, service.verify(&subject.email, &guess, &subject.session)?);
    }
    report(&code, service.verify(&subject.email, &code, &subject.session)?);
    report(&code, service.verify(&subject.email, &code, &subject.session)?);

    Ok(())
}

fn report(guess: &str, outcome: Verification) {
    match outcome {
        Verification::Verified => println!("{guess}: verified"),
        Verification::Invalid { remaining } => {
            println!("{guess}: invalid, {remaining} attempt(s) left")
        }
        Verification::Expired { remaining: None } => {
            println!("{guess}: expired or already used")
        }
        Verification::Expired {
            remaining: Some(remaining),
        } => println!("{guess}: expired, {remaining} attempt(s) left"),
        Verification::Blocked => println!("{guess}: blocked, request a new code"),
    }
}
