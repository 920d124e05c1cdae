use std::io::Write;

use clap::Parser;

use epcis_convert::{ConvertOptions, Representation, VersionTransformer};

/// Converts EPCIS documents between XML and JSON-LD and between schema
/// versions 1.2 and 2.0, streaming stdin to stdout.
#[derive(Debug, Parser)]
#[command(name = "epcis-convert")]
struct Args {
    /// Source representation. Detected from the input when omitted.
    #[arg(long, value_enum)]
    from: Option<ReprArg>,

    /// Target representation.
    #[arg(long, value_enum)]
    to: ReprArg,

    /// Keep 2.0-only constructs as extensions when downconverting to 1.2,
    /// instead of dropping them.
    #[arg(long = "lenient-1-2")]
    lenient_1_2: bool,

    /// Skip the advisory per-event validation.
    #[arg(long)]
    no_validate: bool,

    /// The log verbosity. Can be one of trace|debug|info|warn|error|off
    #[arg(long = "log.level", default_value = "warn")]
    log_level: String,
}

#[derive(Debug, Clone, Copy, clap::ValueEnum)]
enum ReprArg {
    #[value(name = "xml-1.2")]
    Xml12,
    #[value(name = "xml-2.0")]
    Xml20,
    #[value(name = "json-2.0")]
    Json20,
}

impl From<ReprArg> for Representation {
    fn from(arg: ReprArg) -> Representation {
        match arg {
            ReprArg::Xml12 => Representation::XML_1_2,
            ReprArg::Xml20 => Representation::XML_2_0,
            ReprArg::Json20 => Representation::JSON_2_0,
        }
    }
}

fn main() {
    let args = Args::parse();
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(args.log_level.as_str())
        .compact()
        .init();

    let options = ConvertOptions {
        strict12: !args.lenient_1_2,
        validate: !args.no_validate,
        ..ConvertOptions::default()
    };
    let mut stdout = std::io::BufWriter::new(std::io::stdout());
    let result = VersionTransformer::new().convert(
        std::io::stdin(),
        &mut stdout,
        args.from.map(Into::into),
        args.to.into(),
        &options,
    );
    if let Err(error) = result.and_then(|()| stdout.flush().map_err(Into::into)) {
        tracing::error!(error = %error, "conversion failed");
        std::process::exit(1);
    }
}
