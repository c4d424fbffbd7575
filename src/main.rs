use std::io::{self, IsTerminal};
use std::path::PathBuf;
use std::process;

use anyhow::{Context, Result};
use log::debug;
use structopt::clap::AppSettings;
use structopt::StructOpt;

use qrgen::input::{self, InputError};
use qrgen::output::{self, EncodeRequest};
use qrgen::symbol::SymbolConfig;
use qrgen::viewer::SystemViewer;

#[derive(StructOpt)]
#[structopt(
    name = "qrgen",
    about = "Generate a QR code from text.",
    global_settings = &[AppSettings::DisableVersion]
)]
struct Opt {
    /// Text to encode
    text: Option<String>,

    /// Output image file or directory (e.g., out.png)
    #[structopt(short, long, parse(from_os_str))]
    output: Option<PathBuf>,

    /// Print QR as ASCII
    #[structopt(short, long)]
    ascii: bool,

    /// Show version and exit
    #[structopt(short, long)]
    version: bool,
}

fn main() -> Result<()> {
    pretty_env_logger::formatted_builder()
        .filter_level(log::LevelFilter::Warn)
        .parse_default_env()
        .init();

    // help wins over every other argument, valid or not
    if std::env::args_os()
        .skip(1)
        .any(|arg| arg == "-h" || arg == "--help")
    {
        Opt::clap().print_help()?;
        println!();
        return Ok(());
    }

    let opt = Opt::from_args();

    if opt.version {
        println!("{}", qrgen::VERSION);
        return Ok(());
    }

    let stdin = io::stdin();
    let interactive = stdin.is_terminal();

    debug!("stdin is {}", if interactive { "a terminal" } else { "piped" });

    let may_prompt = opt
        .text
        .as_deref()
        .map_or(true, |text| text.trim().is_empty());

    if interactive && may_prompt {
        ctrlc::set_handler(|| {
            let code = input::interrupt_exit_code();

            if code == InputError::Cancelled.exit_code() {
                println!("\n{}", InputError::Cancelled);
            }

            process::exit(code);
        })
        .context("failed to install the interrupt handler")?;
    }

    let text = match input::resolve(
        opt.text.as_deref(),
        interactive,
        &mut stdin.lock(),
        &mut io::stdout(),
    ) {
        Ok(text) => text,
        Err(error) => report(error),
    };

    let request = EncodeRequest::new(text, opt.output, opt.ascii);

    output::dispatch(
        &request,
        &SymbolConfig::default(),
        &mut io::stdout().lock(),
        &SystemViewer,
    )
}

fn report(error: InputError) -> ! {
    match error {
        InputError::Cancelled => println!("\n{}", error),
        _ if error.is_failure_report() => eprintln!("{}", error),
        _ => println!("{}", error),
    }

    process::exit(error.exit_code())
}
