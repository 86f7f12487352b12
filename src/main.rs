use std::str::FromStr;

use anyhow::{Context, Result};
use binutils::verbose;
use clap::Parser;
use tomasulo_sim::{load, simulate, DivZeroPolicy, RegPreset, SimOption};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OutputFormat {
    Plain,
    Json,
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "plain" => Ok(OutputFormat::Plain),
            "json" => Ok(OutputFormat::Json),
            _ => Err(format!(
                "invalid output format: '{s}'. Expected 'plain' or 'json'."
            )),
        }
    }
}

// Cycle-accurate Tomasulo scheduler simulator
#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about,
    long_about = None,
    styles = binutils::get_styles(),
    arg_required_else_help = true,
)]
struct Args {
    /// Path to the input program
    input: String,

    /// Output filename (default is input%.log)
    ///
    /// One line per instruction: issue cycle, execution-complete cycle and
    /// write-back cycle. Instructions that never ran are reported as zeros.
    #[arg(short = 'o', long)]
    output: Option<String>,

    /// Initial register value, e.g. `--reg R2=0x10`. May be repeated
    #[arg(long = "reg", value_name = "R<n>=<value>")]
    registers: Vec<RegPreset>,

    /// Quotient of a division by zero: `dividend` or `zero`
    #[arg(long, default_value = "dividend")]
    div_zero: DivZeroPolicy,

    /// Abort when the program runs longer than this many cycles
    #[arg(long)]
    max_cycles: Option<u64>,

    /// Output format: `plain` or `json`
    #[arg(long, default_value = "plain")]
    format: OutputFormat,

    // -v info, -vv debug, -vvv trace; -q also turns off the per-cycle dump
    #[command(flatten)]
    verbose: verbose::Verbosity,
}

fn main() -> Result<()> {
    let args = Args::parse();

    let log_level = binutils::verbose_level_to_trace(args.verbose.log_level());
    binutils::logging_setup(log_level, None);

    let program = load(&args.input)?;
    tracing::info!("loaded {} instructions from {}", program.len(), &args.input);

    let option = SimOption::default()
        .set_tty_out(!args.verbose.is_silent())
        .set_div_zero(args.div_zero)
        .set_registers(args.registers)
        .set_max_cycles(args.max_cycles);
    let report = simulate(&program, option)?;
    tracing::info!("finished in {} cycles", report.cycles);

    let content = match args.format {
        OutputFormat::Plain => report.to_string(),
        #[cfg(feature = "serde")]
        OutputFormat::Json => report.to_json()?,
        #[cfg(not(feature = "serde"))]
        OutputFormat::Json => anyhow::bail!("json output requires the `serde` feature"),
    };

    let output_path = if let Some(path) = args.output {
        path
    } else {
        let mut path = std::path::PathBuf::from(&args.input);
        path.set_extension(match args.format {
            OutputFormat::Plain => "log",
            OutputFormat::Json => "json",
        });
        path.to_string_lossy().into_owned()
    };
    std::fs::write(&output_path, content)
        .with_context(|| format!("could not write file `{}`", &output_path))?;
    Ok(())
}
