//! Disclosure of resolved configurations.
//!
//! After a configuration is resolved, its properties are written to a [`DisclosureSink`] as lines
//! of the form `Name = "value"`, subject to the [disclosure policies](DisclosurePolicy) of the properties
//! and the configuration.

use std::{
    fmt,
    io::{self, Write as _},
    sync::Arc,
};

use anstream::{AutoStream, ColorChoice};
use anstyle::{AnsiColor, Color, Style};

use crate::{
    config_enum,
    metadata::{ConfigDescriptor, DisclosureMode, DisclosurePolicy, PropertyDescriptor},
};

/// Replacement for masked values.
pub const MASK: &str = "**MASKED**";

const HEADER: Style = Style::new().bold().underline();
const NAME: Style = Style::new().bold();
const VALUE: Style = Style::new().fg_color(Some(Color::Ansi(AnsiColor::Cyan)));
const MASKED: Style = Style::new()
    .bg_color(Some(Color::Ansi(AnsiColor::Cyan)))
    .fg_color(None);

/// Disclosed property value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisclosedValue {
    /// Value in its string presentation.
    Plain(String),
    /// Masked value.
    Masked,
}

impl fmt::Display for DisclosedValue {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Plain(value) => formatter.write_str(value),
            Self::Masked => formatter.write_str(MASK),
        }
    }
}

/// Single line of disclosure output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DisclosureLine<'a> {
    /// Header for the following properties.
    Header {
        /// Configuration name.
        config: &'a str,
        /// Header text.
        text: &'a str,
    },
    /// Property with its value.
    Property {
        /// Configuration name.
        config: &'a str,
        /// Number of spaces to indent the line with.
        indent: usize,
        /// Property name.
        name: &'a str,
        /// Property value.
        value: DisclosedValue,
    },
}

impl DisclosureLine<'_> {
    /// Returns the name of the disclosed configuration.
    pub fn config(&self) -> &str {
        match self {
            Self::Header { config, .. } | Self::Property { config, .. } => config,
        }
    }
}

impl fmt::Display for DisclosureLine<'_> {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Header { text, .. } => formatter.write_str(text),
            Self::Property {
                indent,
                name,
                value,
                ..
            } => write!(formatter, "{:indent$}{name} = \"{value}\"", "", indent = *indent),
        }
    }
}

/// Receiver of disclosure lines.
pub trait DisclosureSink: 'static + Send + Sync + fmt::Debug {
    /// Emits a single line. Sinks are responsible for handling their own I/O errors.
    fn emit(&self, line: &DisclosureLine<'_>);
}

/// Sink emitting each line as an `INFO` [`tracing`] event with the `config_gate::disclosure` target.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingSink;

impl DisclosureSink for TracingSink {
    fn emit(&self, line: &DisclosureLine<'_>) {
        tracing::info!(target: "config_gate::disclosure", config = line.config(), "{line}");
    }
}

/// Sink writing lines directly to stdout, optionally with ANSI styling.
#[derive(Debug, Clone, Copy)]
pub struct ConsoleSink {
    color: ColorChoice,
    max_level: tracing::Level,
}

impl Default for ConsoleSink {
    fn default() -> Self {
        Self::new()
    }
}

impl ConsoleSink {
    /// Creates a sink with automatically detected styling support.
    pub fn new() -> Self {
        Self {
            color: ColorChoice::Auto,
            max_level: tracing::Level::INFO,
        }
    }

    /// Enables or disables ANSI styling. If enabled, styling is still subject to auto-detection.
    #[must_use]
    pub fn with_color(mut self, enabled: bool) -> Self {
        self.color = if enabled {
            ColorChoice::Auto
        } else {
            ColorChoice::Never
        };
        self
    }

    /// Sets the most verbose level of output. Disclosure lines are informational, so they are suppressed
    /// if the level is less verbose than `INFO`.
    #[must_use]
    pub fn with_max_level(mut self, level: tracing::Level) -> Self {
        self.max_level = level;
        self
    }

    fn write_line(&self, line: &DisclosureLine<'_>) -> io::Result<()> {
        let mut writer = AutoStream::new(io::stdout(), self.color).lock();
        match line {
            DisclosureLine::Header { text, .. } => writeln!(writer, "{HEADER}{text}{HEADER:#}"),
            DisclosureLine::Property {
                indent,
                name,
                value,
                ..
            } => {
                write!(writer, "{:indent$}{NAME}{name}{NAME:#} = ", "", indent = *indent)?;
                match value {
                    DisclosedValue::Plain(value) => writeln!(writer, "{VALUE}\"{value}\"{VALUE:#}"),
                    DisclosedValue::Masked => writeln!(writer, "\"{MASKED}{MASK}{MASKED:#}\""),
                }
            }
        }
    }
}

impl DisclosureSink for ConsoleSink {
    fn emit(&self, line: &DisclosureLine<'_>) {
        if self.max_level < tracing::Level::INFO {
            return;
        }
        if let Err(err) = self.write_line(line) {
            tracing::warn!(%err, "failed writing disclosure to stdout");
        }
    }
}

/// Method of disclosure output.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogMethod {
    /// Emit [`tracing`] events.
    #[default]
    Tracing,
    /// Write directly to stdout.
    Console,
}

config_enum!(LogMethod { Tracing, Console });

impl LogMethod {
    /// Creates a sink for this method.
    pub fn sink(self, color: bool, max_level: tracing::Level) -> Arc<dyn DisclosureSink> {
        match self {
            Self::Tracing => Arc::new(TracingSink),
            Self::Console => Arc::new(
                ConsoleSink::new()
                    .with_color(color)
                    .with_max_level(max_level),
            ),
        }
    }
}

fn effective_mode<T>(property: &PropertyDescriptor<T>, class: Option<&DisclosurePolicy>) -> DisclosureMode {
    if let Some(policy) = property.disclosure() {
        return policy.mode;
    }
    if property.is_secret() {
        return DisclosureMode::Masked;
    }
    class.map(|policy| policy.mode).unwrap_or_default()
}

/// Writes properties of `config` to `sink` according to their disclosure policies.
#[tracing::instrument(level = "debug", skip_all, fields(config = descriptor.name()))]
pub(crate) fn disclose<T: 'static>(config: &T, descriptor: &ConfigDescriptor<T>, sink: &dyn DisclosureSink) {
    let class = descriptor.disclosure();
    let class_header = class.and_then(|policy| policy.header.as_deref());
    let mut current_header = None;

    for property in descriptor.properties() {
        let mode = effective_mode(property, class);
        let value = match mode {
            DisclosureMode::Never => continue,
            DisclosureMode::Masked => DisclosedValue::Masked,
            DisclosureMode::Always | DisclosureMode::IfNotEmpty => {
                let value = property.get(config);
                if mode == DisclosureMode::IfNotEmpty && value.is_empty() {
                    continue;
                }
                DisclosedValue::Plain(value.to_string())
            }
        };

        let header = property
            .disclosure()
            .and_then(|policy| policy.header.as_deref())
            .or(class_header);
        if let Some(text) = header
            && current_header != Some(text)
        {
            sink.emit(&DisclosureLine::Header {
                config: descriptor.name(),
                text,
            });
        }
        current_header = header;

        sink.emit(&DisclosureLine::Property {
            config: descriptor.name(),
            indent: if header.is_some() { 2 } else { 0 },
            name: property.name(),
            value,
        });
    }
}
