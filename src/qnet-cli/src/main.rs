// Copyright 2021 The Simlin Authors. All rights reserved.
// Use of this source code is governed by the Apache License,
// Version 2.0, that can be found in the LICENSE file.

use std::fs::File;
use std::io::{self, Write};

use clap::{Parser, Subcommand, ValueEnum};
use tracing::debug;

use qnet_core::model::ResultKind;
use qnet_core::Result;
use qnet_engine::writer::{table, xml};
use qnet_engine::{Document, Options};

const EXIT_FAILURE: i32 = 1;

#[macro_export]
macro_rules! die(
    ($($arg:tt)*) => { {
        eprintln!($($arg)*);
        std::process::exit(EXIT_FAILURE)
    } }
);

#[derive(Parser)]
#[command(name = "qnet")]
#[command(version = "1.0")]
#[command(about = "Convert and run queueing network experiment documents")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Parse a document and report problems
    Check {
        /// Input document, or - for standard input
        input: String,
    },

    /// Write the document back out
    Convert {
        input: String,

        /// Write resolved numbers instead of variables
        #[arg(long)]
        strict: bool,

        /// Write only the parts needed for bounds analysis
        #[arg(long)]
        bounds: bool,

        /// Path to write output file
        #[arg(long)]
        output: Option<String>,
    },

    /// Print the program that runs the experiment
    Program {
        input: String,

        /// Append a gnuplot script plotting this result
        #[arg(long, value_enum)]
        plot: Option<PlotKind>,

        /// Class or station to plot
        #[arg(long, requires = "plot")]
        arg: Option<String>,
    },

    /// Print the column titles of the experiment output
    Header { input: String },

    /// Tabulate results saved in the document
    Results {
        input: String,

        /// Path to write output file
        #[arg(long)]
        output: Option<String>,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum PlotKind {
    QueueLength,
    ResidenceTime,
    ResponseTime,
    Throughput,
    Utilization,
}

impl From<PlotKind> for ResultKind {
    fn from(kind: PlotKind) -> Self {
        match kind {
            PlotKind::QueueLength => ResultKind::QueueLength,
            PlotKind::ResidenceTime => ResultKind::ResidenceTime,
            PlotKind::ResponseTime => ResultKind::ResponseTime,
            PlotKind::Throughput => ResultKind::Throughput,
            PlotKind::Utilization => ResultKind::Utilization,
        }
    }
}

fn load(input: &str, options: Options) -> Document {
    match Document::load(input, options) {
        Ok(doc) => {
            for warning in doc.warnings() {
                eprintln!("{}:{}", input, warning);
            }
            doc
        }
        Err(err) => die!("{}: {}", input, err),
    }
}

/// Runs `f` against the file at `path`, or against `stdout` when no
/// path was given.
fn with_output<T>(
    path: Option<&str>,
    stdout: &mut dyn Write,
    f: impl FnOnce(&mut dyn Write) -> Result<T>,
) -> Result<T> {
    match path {
        Some(path) => {
            debug!(path = path, "writing output");
            let mut file = File::create(path)?;
            let result = f(&mut file)?;
            file.flush()?;
            Ok(result)
        }
        None => f(stdout),
    }
}

fn check(input: &str, out: &mut dyn Write) -> Result<()> {
    let doc = load(input, Options::default());
    let undefined = doc.undefined_external_variables();
    if !undefined.is_empty() {
        eprintln!("{}: undefined variables: {}", input, undefined.join(", "));
    }
    writeln!(
        out,
        "{}: {} classes, {} stations, {} sweeps",
        input,
        doc.model().chains.len(),
        doc.model().stations.len(),
        doc.whatifs().len()
    )?;
    Ok(())
}

fn convert(
    input: &str,
    strict: bool,
    bounds: bool,
    output: Option<&str>,
    stdout: &mut dyn Write,
) -> Result<()> {
    let doc = load(input, Options { strict, ..Default::default() });
    let text = if strict && !bounds {
        xml::print(&doc)?
    } else {
        xml::export(&doc, bounds)?
    };
    with_output(output, stdout, |out| Ok(out.write_all(text.as_bytes())?))
}

fn program(input: &str, plot: Option<PlotKind>, arg: Option<&str>, out: &mut dyn Write) -> Result<()> {
    let mut doc = load(input, Options::default());
    if let Some(embedded) = doc.embedded_program() {
        debug!(line = embedded.line, "using embedded program");
        writeln!(out, "{}", embedded.text)?;
        return Ok(());
    }
    if let Some(kind) = plot {
        doc.plot(kind.into(), arg)?;
    }
    write!(out, "{}", doc.program())?;
    Ok(())
}

fn header(input: &str, out: &mut dyn Write) -> Result<()> {
    let doc = load(input, Options::default());
    table::write_header(&doc, out)
}

fn results(input: &str, output: Option<&str>, stdout: &mut dyn Write) -> Result<()> {
    let doc = load(input, Options::default());
    let count = with_output(output, stdout, |out| table::write_results(&doc, out))?;
    debug!(rows = count, "results written");
    Ok(())
}

fn run(command: &Command, stdout: &mut dyn Write) -> Result<()> {
    match command {
        Command::Check { input } => check(input, stdout),
        Command::Convert {
            input,
            strict,
            bounds,
            output,
        } => convert(input, *strict, *bounds, output.as_deref(), stdout),
        Command::Program { input, plot, arg } => program(input, *plot, arg.as_deref(), stdout),
        Command::Header { input } => header(input, stdout),
        Command::Results { input, output } => results(input, output.as_deref(), stdout),
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_writer(io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    let cli = Cli::parse();
    let mut stdout = io::stdout().lock();
    if let Err(err) = run(&cli.command, &mut stdout) {
        die!("error: {}", err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    fn model_path(name: &str) -> String {
        format!("{}/../qnet-engine/tests/models/{}", env!("CARGO_MANIFEST_DIR"), name)
    }

    fn run_args(args: &[&str]) -> String {
        let cli = Cli::try_parse_from(args).unwrap();
        let mut out = vec![];
        run(&cli.command, &mut out).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_check() {
        let input = model_path("closed.jmva");
        let out = run_args(&["qnet", "check", input.as_str()]);
        assert_eq!(format!("{input}: 1 classes, 3 stations, 1 sweeps\n"), out);
    }

    #[test]
    fn test_convert_to_file() {
        let dir = tempfile::tempdir().unwrap();
        for (flags, sweeps) in [(&[][..], true), (&["--strict"][..], false), (&["--bounds"][..], false)] {
            let output = dir.path().join("out.jmva");
            let output = output.to_str().unwrap();
            let input = model_path("closed.jmva");
            let mut args = vec!["qnet", "convert", input.as_str(), "--output", output];
            args.extend_from_slice(flags);
            assert_eq!("", run_args(&args));

            let text = fs::read_to_string(output).unwrap();
            assert!(text.starts_with("<?xml"), "{flags:?}");
            assert_eq!(sweeps, text.contains("<whatIf"), "{flags:?}");
            let doc = Document::load(output, Options::default()).unwrap();
            assert_eq!(3, doc.model().stations.len());
        }
    }

    #[test]
    fn test_program() {
        let input = model_path("closed.jmva");
        let out = run_args(&["qnet", "program", input.as_str()]);
        assert!(out.contains("foreach ($N1 in [1.0, 2.0, 3.0, 4.0, 5.0]) {"), "{out}");

        let out = run_args(&["qnet", "program", input.as_str(), "--plot", "throughput"]);
        assert!(out.contains("$DATA << EOF"), "{out}");

        let out = run_args(&["qnet", "program", input.as_str(), "--plot", "utilization", "--arg", "cpu"]);
        assert!(out.contains("Station cpu"), "{out}");

        assert!(Cli::try_parse_from(["qnet", "program", input.as_str(), "--arg", "cpu"]).is_err());
    }

    #[test]
    fn test_embedded_program() {
        let text = fs::read_to_string(model_path("closed.jmva")).unwrap().replace(
            "</model>",
            "<lqx><![CDATA[println(\"embedded\");]]></lqx>\n</model>",
        );
        let file = tempfile::Builder::new().suffix(".jmva").tempfile().unwrap();
        fs::write(file.path(), text).unwrap();
        let out = run_args(&["qnet", "program", file.path().to_str().unwrap(), "--plot", "throughput"]);
        assert_eq!("println(\"embedded\");\n", out);
    }

    #[test]
    fn test_header_and_results() {
        let input = model_path("mixed.jmva");
        let out = run_args(&["qnet", "header", input.as_str()]);
        assert!(out.starts_with("Station,"), "{out}");

        let dir = tempfile::tempdir().unwrap();
        let output = dir.path().join("results.csv");
        let output = output.to_str().unwrap();
        assert_eq!("", run_args(&["qnet", "results", input.as_str(), "--output", output]));
        let text = fs::read_to_string(output).unwrap();
        let mut lines = text.lines();
        assert_eq!(Some("iteration,solver,station,class,measure,value"), lines.next());
        assert!(text.contains("1,MVA,cpu,batch,Throughput,0.76\n"), "{text}");
        assert!(text.contains("1,MVA,cpu,web,Utilization,0.1\n"), "{text}");
    }
}
