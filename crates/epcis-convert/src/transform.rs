//! Conversion planning and pipelined execution.
//!
//! A conversion is a path through the three-cell grid (XML-1.2, XML-2.0,
//! JSON-2.0); every plan is at most two legs. Multi-leg plans run each leg
//! on its own scoped thread with a bounded byte pipe in between, so the
//! whole pipeline streams and a stalled consumer holds back the producer.
//! The scope joins every leg on every exit path.

use std::fmt;
use std::io::{self, BufReader, Read, Write};

use crate::collect::{JsonStreamCollector, XmlStreamCollector};
use crate::error::{Error, Result};
use crate::input::Input;
use crate::json_to_xml::JsonToXmlConverter;
use crate::pipe;
use crate::prescan::prescan;
use crate::sink::EventSink;
use crate::validate::EventValidator;
use crate::xml_to_json::XmlToJsonConverter;
use crate::EventMapper;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocFormat {
    Xml,
    Json,
}

impl fmt::Display for DocFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DocFormat::Xml => "xml",
            DocFormat::Json => "json",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchemaVersion {
    V1_2,
    V2_0,
}

impl fmt::Display for SchemaVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            SchemaVersion::V1_2 => "1.2",
            SchemaVersion::V2_0 => "2.0",
        })
    }
}

/// One cell of the conversion grid. There is no JSON-1.2: JSON-LD exists
/// only from 2.0 onward, so construction rejects that combination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Representation {
    format: DocFormat,
    version: SchemaVersion,
}

impl Representation {
    pub const XML_1_2: Representation = Representation {
        format: DocFormat::Xml,
        version: SchemaVersion::V1_2,
    };
    pub const XML_2_0: Representation = Representation {
        format: DocFormat::Xml,
        version: SchemaVersion::V2_0,
    };
    pub const JSON_2_0: Representation = Representation {
        format: DocFormat::Json,
        version: SchemaVersion::V2_0,
    };

    pub fn new(format: DocFormat, version: SchemaVersion) -> Result<Representation> {
        if format == DocFormat::Json && version == SchemaVersion::V1_2 {
            return Err(Error::Config(
                "JSON-LD documents exist only from schema version 2.0".to_string(),
            ));
        }
        Ok(Representation { format, version })
    }

    pub fn format(&self) -> DocFormat {
        self.format
    }

    pub fn version(&self) -> SchemaVersion {
        self.version
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.format, self.version)
    }
}

/// One pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Leg {
    UpconvertXml,
    DowncovertXml,
    XmlToJson,
    JsonToXml,
}

/// Shortest path through the grid. Identity is the empty plan.
pub fn plan(source: Representation, target: Representation) -> Vec<Leg> {
    use Representation as R;
    if source == target {
        return Vec::new();
    }
    match (source, target) {
        (R::XML_1_2, R::XML_2_0) => vec![Leg::UpconvertXml],
        (R::XML_1_2, R::JSON_2_0) => vec![Leg::UpconvertXml, Leg::XmlToJson],
        (R::XML_2_0, R::XML_1_2) => vec![Leg::DowncovertXml],
        (R::XML_2_0, R::JSON_2_0) => vec![Leg::XmlToJson],
        (R::JSON_2_0, R::XML_2_0) => vec![Leg::JsonToXml],
        (R::JSON_2_0, R::XML_1_2) => vec![Leg::JsonToXml, Leg::DowncovertXml],
        _ => Vec::new(),
    }
}

/// Knobs shared by every leg of one conversion.
pub struct ConvertOptions<'a> {
    /// Drop 2.0-only constructs when downconverting instead of keeping
    /// them as extensions.
    pub strict12: bool,
    /// Run the advisory validator over each emitted event.
    pub validate: bool,
    pub mapper: Option<&'a EventMapper>,
    /// Chunk capacity of the pipes between legs.
    pub pipe_capacity: usize,
}

impl Default for ConvertOptions<'_> {
    fn default() -> Self {
        ConvertOptions {
            strict12: true,
            validate: true,
            mapper: None,
            pipe_capacity: 16,
        }
    }
}

/// Orchestrates conversions between any two grid cells.
#[derive(Default)]
pub struct VersionTransformer;

impl VersionTransformer {
    pub fn new() -> VersionTransformer {
        VersionTransformer
    }

    /// Converts `input` into `output`. When `source` is unspecified it is
    /// prescanned from the input, which stays rewound to byte zero. A
    /// source equal to the target copies the stream through untouched.
    #[tracing::instrument(level = "debug", skip(self, input, output, options))]
    pub fn convert<R, W>(
        &self,
        input: R,
        output: &mut W,
        source: Option<Representation>,
        target: Representation,
        options: &ConvertOptions<'_>,
    ) -> Result<()>
    where
        R: Read + Send + 'static,
        W: Write,
    {
        let mut input = Input::new(input);
        let source = match source {
            Some(source) => source,
            None => prescan(&mut input)?.representation()?,
        };
        let legs = plan(source, target);
        tracing::debug!(%source, %target, ?legs, "planned conversion");
        if legs.is_empty() {
            io::copy(&mut input.into_stream(), output)?;
            return Ok(());
        }
        run_pipeline(input, output, &legs, options)
    }
}

fn run_pipeline<W: Write>(
    input: Input,
    output: &mut W,
    legs: &[Leg],
    options: &ConvertOptions<'_>,
) -> Result<()> {
    let (last, intermediate) = match legs.split_last() {
        Some(split) => split,
        None => return Ok(()),
    };
    std::thread::scope(|scope| {
        let mut handles = Vec::new();
        let mut upstream: Box<dyn Read + Send> = input.into_stream();
        for leg in intermediate {
            let (tx, rx) = pipe::pipe(options.pipe_capacity);
            let reader = std::mem::replace(&mut upstream, Box::new(rx));
            let leg = *leg;
            handles.push(scope.spawn(move || run_leg(leg, reader, tx, options)));
        }
        let last_result = run_leg(*last, upstream, &mut *output, options);
        // upstream failures explain downstream ones; report them first
        let mut first_error: Option<Error> = None;
        for handle in handles {
            match handle.join() {
                Ok(Ok(())) => {}
                Ok(Err(e)) => {
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
                Err(_) => {
                    if first_error.is_none() {
                        first_error = Some(Error::conversion("conversion pipeline leg panicked"));
                    }
                }
            }
        }
        match first_error {
            Some(e) => Err(e),
            None => last_result,
        }
    })
}

fn run_leg<R, W>(leg: Leg, reader: R, writer: W, options: &ConvertOptions<'_>) -> Result<()>
where
    R: Read,
    W: Write,
{
    match leg {
        Leg::UpconvertXml => crate::versions::upconvert(BufReader::new(reader), writer),
        Leg::DowncovertXml => {
            crate::versions::downconvert(BufReader::new(reader), writer, options.strict12)
        }
        Leg::XmlToJson => {
            let validator = leg_validator(options)?;
            let collector = JsonStreamCollector::new(writer);
            let mut sink = EventSink::new(validator, Some(collector))?;
            let converter = match options.mapper {
                Some(mapper) => XmlToJsonConverter::with_mapper(mapper),
                None => XmlToJsonConverter::new(),
            };
            converter.convert(BufReader::new(reader), &mut sink)?;
            Ok(())
        }
        Leg::JsonToXml => {
            let validator = leg_validator(options)?;
            let collector = XmlStreamCollector::new(writer);
            let mut sink = EventSink::new(validator, Some(collector))?;
            let converter = match options.mapper {
                Some(mapper) => JsonToXmlConverter::with_mapper(mapper),
                None => JsonToXmlConverter::new(),
            };
            converter.convert(reader, &mut sink)?;
            Ok(())
        }
    }
}

fn leg_validator(options: &ConvertOptions<'_>) -> Result<Option<&'static EventValidator>> {
    if options.validate {
        Ok(Some(EventValidator::shared()?))
    } else {
        Ok(None)
    }
}
