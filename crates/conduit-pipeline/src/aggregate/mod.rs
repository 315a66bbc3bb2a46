//! Multi-source aggregation.
//!
//! Each source runs as its own single-source pipeline, one after another,
//! into the same output. Records are tagged with `_label` and `_source` so
//! consumers can tell the streams apart. A failing source either stops the
//! run (fail-fast) or is reported inline as an error record while the
//! remaining sources continue. Records already written are never retracted.

use std::fmt;
use std::io::{self, Write};
use std::str::FromStr;

use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::builder::PipelineBuilder;
use crate::engine::{Consumption, Engine};
use crate::error::PipelineError;

const AGGREGATE_TARGET: &str = "conduit_pipeline::aggregate";

const LABEL_SEPARATOR: &str = ":label=";

/// Field injected with the source label.
pub const LABEL_FIELD: &str = "_label";

/// Field injected with the source address.
pub const SOURCE_FIELD: &str = "_source";

/// Field marking an inline error record.
pub const ERROR_FIELD: &str = "_error";

/// One source of an aggregation, written `address[:label=Label]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceSpec {
    address: String,
    label: String,
}

impl SourceSpec {
    /// Parses `address[:label=Label]`. Without a label the address is used.
    ///
    /// ```
    /// use conduit_pipeline::SourceSpec;
    ///
    /// let spec = SourceSpec::parse("sales.csv:label=Sales")?;
    /// assert_eq!(spec.address(), "sales.csv");
    /// assert_eq!(spec.label(), "Sales");
    /// # Ok::<(), conduit_pipeline::PipelineError>(())
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::InvalidSource`] when the address or label is
    /// empty.
    pub fn parse(spec: &str) -> Result<Self, PipelineError> {
        let invalid = |message: &str| PipelineError::InvalidSource {
            spec: spec.to_owned(),
            message: message.to_owned(),
        };
        let (address, label) = match spec.rfind(LABEL_SEPARATOR) {
            Some(position) => {
                let address = spec.get(..position).unwrap_or_default();
                let label = spec
                    .get(position + LABEL_SEPARATOR.len()..)
                    .unwrap_or_default();
                if label.trim().is_empty() {
                    return Err(invalid("label must not be empty"));
                }
                (address, label)
            }
            None => (spec, spec),
        };
        if address.trim().is_empty() {
            return Err(invalid("address must not be empty"));
        }
        Ok(Self {
            address: address.to_owned(),
            label: label.to_owned(),
        })
    }

    /// Address handed to the pipeline builder.
    #[must_use]
    pub const fn address(&self) -> &str {
        self.address.as_str()
    }

    /// Label injected into every record.
    #[must_use]
    pub const fn label(&self) -> &str {
        self.label.as_str()
    }
}

impl FromStr for SourceSpec {
    type Err = PipelineError;

    fn from_str(spec: &str) -> Result<Self, Self::Err> {
        Self::parse(spec)
    }
}

impl fmt::Display for SourceSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.address == self.label {
            f.write_str(&self.address)
        } else {
            write!(f, "{}{LABEL_SEPARATOR}{}", self.address, self.label)
        }
    }
}

/// What happened to one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceOutcome {
    /// The pipeline ran to completion.
    Completed {
        /// Records forwarded from this source.
        records: usize,
    },
    /// Resolution or execution failed.
    Failed {
        /// Rendered error.
        message: String,
        /// Exit code mirroring the error.
        exit_code: i32,
    },
    /// Not run because an earlier source failed in fail-fast mode.
    Skipped,
}

/// Outcome for one source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceReport {
    spec: SourceSpec,
    outcome: SourceOutcome,
}

impl SourceReport {
    /// The source.
    #[must_use]
    pub const fn spec(&self) -> &SourceSpec {
        &self.spec
    }

    /// What happened to it.
    #[must_use]
    pub const fn outcome(&self) -> &SourceOutcome {
        &self.outcome
    }
}

/// Result of an aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateReport {
    sources: Vec<SourceReport>,
    first_failure: Option<usize>,
    fail_fast: bool,
}

impl AggregateReport {
    /// Per-source outcomes in input order.
    #[must_use]
    pub fn sources(&self) -> &[SourceReport] {
        &self.sources
    }

    /// The first source that failed.
    #[must_use]
    pub fn first_failure(&self) -> Option<&SourceReport> {
        self.first_failure.and_then(|index| self.sources.get(index))
    }

    /// Whether every source completed.
    #[must_use]
    pub const fn is_success(&self) -> bool {
        self.first_failure.is_none()
    }

    /// Exit code for the run.
    ///
    /// Fail-fast runs exit with the first failure's code. Continuing runs
    /// surface failures inline and only exit non-zero when no source
    /// completed.
    #[must_use]
    pub fn exit_code(&self) -> i32 {
        let Some(SourceOutcome::Failed { exit_code, .. }) =
            self.first_failure().map(SourceReport::outcome)
        else {
            return 0;
        };
        let any_completed = self
            .sources
            .iter()
            .any(|source| matches!(source.outcome, SourceOutcome::Completed { .. }));
        if self.fail_fast || !any_completed {
            *exit_code
        } else {
            0
        }
    }
}

/// Runs sources in sequence into one labelled stream.
#[derive(Debug, Clone)]
pub struct Aggregator<'a> {
    builder: PipelineBuilder<'a>,
    engine: Engine<'a>,
}

impl<'a> Aggregator<'a> {
    /// Creates an aggregator.
    #[must_use]
    pub const fn new(builder: PipelineBuilder<'a>, engine: Engine<'a>) -> Self {
        Self { builder, engine }
    }

    /// Runs every source in order.
    ///
    /// # Errors
    ///
    /// Returns [`PipelineError::Output`] when `output` fails. Every other
    /// failure is recorded per source.
    pub fn run<W: Write + ?Sized>(
        &self,
        sources: &[SourceSpec],
        fail_fast: bool,
        output: &mut W,
    ) -> Result<AggregateReport, PipelineError> {
        let mut reports = Vec::with_capacity(sources.len());
        let mut first_failure = None;

        for (index, spec) in sources.iter().enumerate() {
            if fail_fast && first_failure.is_some() {
                debug!(target: AGGREGATE_TARGET, source = %spec, "skipping source after failure");
                reports.push(SourceReport {
                    spec: spec.clone(),
                    outcome: SourceOutcome::Skipped,
                });
                continue;
            }

            let outcome = match self.run_source(spec, output) {
                Ok(records) => {
                    info!(target: AGGREGATE_TARGET, source = %spec, records, "source completed");
                    SourceOutcome::Completed { records }
                }
                Err(error @ PipelineError::Output { .. }) => return Err(error),
                Err(error) => {
                    warn!(target: AGGREGATE_TARGET, source = %spec, %error, "source failed");
                    if !fail_fast {
                        write_error_record(output, spec, &error)?;
                    }
                    first_failure.get_or_insert(index);
                    SourceOutcome::Failed {
                        message: error.to_string(),
                        exit_code: error.exit_code(),
                    }
                }
            };
            reports.push(SourceReport {
                spec: spec.clone(),
                outcome,
            });
        }

        Ok(AggregateReport {
            sources: reports,
            first_failure,
            fail_fast,
        })
    }

    fn run_source<W: Write + ?Sized>(
        &self,
        spec: &SourceSpec,
        output: &mut W,
    ) -> Result<usize, PipelineError> {
        let tokens: Vec<&str> = spec.address().split_whitespace().collect();
        let pipeline = self.builder.build(&tokens)?;
        let mut labelled = LabellingWriter::new(output, spec);
        let result = self
            .engine
            .execute(&pipeline, Consumption::All, &mut labelled)?;
        let records = labelled.finish().map_err(|source| PipelineError::Output {
            source: source.into(),
        })?;
        result.into_result()?;
        Ok(records)
    }
}

fn write_error_record<W: Write + ?Sized>(
    output: &mut W,
    spec: &SourceSpec,
    error: &PipelineError,
) -> Result<(), PipelineError> {
    let record = json!({
        ERROR_FIELD: true,
        LABEL_FIELD: spec.label(),
        SOURCE_FIELD: spec.address(),
        "message": error.to_string(),
    });
    let written = serde_json::to_writer(&mut *output, &record)
        .map_err(io::Error::from)
        .and_then(|()| output.write_all(b"\n"))
        .and_then(|()| output.flush());
    written.map_err(|source| PipelineError::Output {
        source: source.into(),
    })
}

/// Splits a byte stream into lines and tags each JSON record.
struct LabellingWriter<'w, W: Write + ?Sized> {
    inner: &'w mut W,
    spec: &'w SourceSpec,
    pending: Vec<u8>,
    records: usize,
}

impl<'w, W: Write + ?Sized> LabellingWriter<'w, W> {
    const fn new(inner: &'w mut W, spec: &'w SourceSpec) -> Self {
        Self {
            inner,
            spec,
            pending: Vec::new(),
            records: 0,
        }
    }

    fn emit(&mut self, line: &[u8]) -> io::Result<()> {
        let trimmed = line.trim_ascii();
        if trimmed.is_empty() {
            return Ok(());
        }
        let mut record = match serde_json::from_slice::<Value>(trimmed) {
            Ok(Value::Object(map)) => map,
            Ok(other) => {
                let mut map = Map::new();
                map.insert(String::from("value"), other);
                map
            }
            Err(error) => {
                warn!(
                    target: AGGREGATE_TARGET,
                    source = %self.spec,
                    %error,
                    "dropping line that is not JSON"
                );
                return Ok(());
            }
        };
        record.insert(String::from(LABEL_FIELD), Value::from(self.spec.label()));
        record.insert(String::from(SOURCE_FIELD), Value::from(self.spec.address()));
        serde_json::to_writer(&mut *self.inner, &record)?;
        self.inner.write_all(b"\n")?;
        self.records += 1;
        Ok(())
    }

    /// Emits any unterminated final line and returns the record count.
    fn finish(mut self) -> io::Result<usize> {
        let rest = std::mem::take(&mut self.pending);
        self.emit(&rest)?;
        self.inner.flush()?;
        Ok(self.records)
    }
}

impl<W: Write + ?Sized> Write for LabellingWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.pending.extend_from_slice(buf);
        while let Some(end) = self.pending.iter().position(|byte| *byte == b'\n') {
            let line: Vec<u8> = self.pending.drain(..=end).collect();
            self.emit(&line)?;
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}
