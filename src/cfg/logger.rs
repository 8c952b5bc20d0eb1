// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fs, path::Path, sync::Arc};

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value, json};
use tracing::{Event, Subscriber, field::Field};
use tracing_appender::{
    non_blocking::{NonBlocking, WorkerGuard},
    rolling::{RollingFileAppender, Rotation},
};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{
        self, FmtContext, FormatEvent, FormatFields, FormattedFields,
        format::{FmtSpan, JsonFields, Writer},
    },
    layer::SubscriberExt,
    registry::LookupSpan,
};

#[derive(Debug, Deserialize, Clone)]
struct LoggerConfig {
    logger: LogConfig,
}

#[derive(Debug, Deserialize, Clone)]
struct LogConfig {
    level: String,
    output: LogOutput,
    #[serde(default)]
    format: LogFormat,
    #[serde(default)]
    is_show_line: bool,
    #[serde(default)]
    is_show_module_path: bool,
    #[serde(default)]
    is_show_target: bool,
    file: Option<LogFileConfig>,
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogOutput {
    Stdout,
    Stderr,
    File,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
enum LogFormat {
    #[default]
    Json,
    Pretty,
}

#[derive(Debug, Deserialize, Clone)]
struct LogFileConfig {
    path: String,
    rotation_frequency: Option<String>,
}

impl LogFileConfig {
    fn rotation(&self) -> Rotation {
        match self.rotation_frequency.as_deref() {
            Some("minutely") => Rotation::MINUTELY,
            Some("hourly") => Rotation::HOURLY,
            Some("daily") => Rotation::DAILY,
            _ => Rotation::NEVER,
        }
    }

    /// Directory and file name of `path`.
    fn split(&self) -> (&Path, &str) {
        let path = Path::new(&self.path);
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let name = path.file_name().and_then(|n| n.to_str()).unwrap_or("osd.log");
        (dir, name)
    }
}

/// One JSON log line.
#[derive(Serialize)]
struct LogEntry {
    timestamp: String,
    level: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    target: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    module_path: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    line: Option<u32>,
    fields: Map<String, Value>,
}

impl LogEntry {
    fn new(config: &LogConfig, event: &Event, fields: Map<String, Value>) -> Self {
        let meta = event.metadata();
        Self {
            timestamp: chrono::Utc::now().to_rfc3339(),
            level: meta.level().to_string(),
            target: config.is_show_target.then(|| meta.target().to_string()),
            module_path: config
                .is_show_module_path
                .then(|| meta.module_path().unwrap_or_default().to_string()),
            line: if config.is_show_line { meta.line() } else { None },
            fields,
        }
    }
}

/// Writes each event as one JSON object, merging the fields of the
/// enclosing spans and listing their names under `span_names`.
struct JsonFormatter {
    config: Arc<LogConfig>,
}

impl<S, N> FormatEvent<S, N> for JsonFormatter
where
    S: Subscriber + for<'a> LookupSpan<'a>,
    N: for<'a> FormatFields<'a> + 'static,
{
    fn format_event(
        &self,
        ctx: &FmtContext<'_, S, N>,
        mut writer: Writer<'_>,
        event: &Event<'_>,
    ) -> std::fmt::Result {
        let mut visitor = JsonVisitor::default();
        event.record(&mut visitor);
        let mut fields = visitor.fields;

        if let Some(scope) = ctx.event_scope() {
            let mut span_names = Vec::new();
            for span in scope.from_root() {
                span_names.push(span.name().to_string());
                if let Some(ext) = span.extensions().get::<FormattedFields<JsonFields>>()
                {
                    let span_fields: HashMap<String, Value> =
                        serde_json::from_str(&ext.fields).unwrap_or_default();
                    fields.extend(span_fields);
                }
            }
            fields.insert("span_names".to_string(), json!(span_names));
        }

        let entry = LogEntry::new(&self.config, event, fields);
        writeln!(
            writer,
            "{}",
            serde_json::to_string(&entry).map_err(|_| std::fmt::Error)?
        )
    }
}

#[derive(Default)]
struct JsonVisitor {
    fields: Map<String, Value>,
}

impl tracing::field::Visit for JsonVisitor {
    fn record_u64(&mut self, field: &Field, value: u64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_i64(&mut self, field: &Field, value: i64) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), json!(value));
    }

    fn record_debug(&mut self, field: &Field, value: &dyn std::fmt::Debug) {
        self.fields
            .insert(field.name().to_string(), json!(format!("{value:?}")));
    }
}

fn make_writer(config: &LogConfig) -> Result<(NonBlocking, WorkerGuard)> {
    Ok(match config.output {
        LogOutput::Stdout => tracing_appender::non_blocking(std::io::stdout()),
        LogOutput::Stderr => tracing_appender::non_blocking(std::io::stderr()),
        LogOutput::File => {
            let file = config
                .file
                .as_ref()
                .context("logger output is `file` but no `file` section is given")?;
            let (dir, name) = file.split();
            let appender = RollingFileAppender::new(file.rotation(), dir, name);
            tracing_appender::non_blocking(appender)
        },
    })
}

/// Installs the process-wide subscriber described by the YAML file at
/// `config_path`. Keep the returned guard alive to flush buffered lines.
pub fn init_logger(config_path: &str) -> Result<WorkerGuard> {
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("Failed to read logger config: {config_path}"))?;
    let config: LoggerConfig = serde_yaml::from_str(&content)
        .with_context(|| format!("Failed to parse logger config: {config_path}"))?;
    let config = Arc::new(config.logger);

    let (writer, guard) = make_writer(&config)?;
    let env_filter = EnvFilter::try_new(&config.level)
        .context("Failed to parse log level from config")?;

    let layer = match config.format {
        LogFormat::Json => fmt::layer()
            .with_writer(writer)
            .with_span_events(FmtSpan::NEW | FmtSpan::CLOSE)
            .json()
            .event_format(JsonFormatter {
                config: Arc::clone(&config),
            })
            .fmt_fields(JsonFields::default())
            .boxed(),
        LogFormat::Pretty => fmt::layer()
            .with_writer(writer)
            .with_ansi(config.output != LogOutput::File)
            .with_line_number(config.is_show_line)
            .with_target(config.is_show_target)
            .boxed(),
    };

    let subscriber = tracing_subscriber::registry().with(env_filter).with(layer);
    if tracing::subscriber::set_global_default(subscriber).is_err() {
        bail!("a global tracing subscriber is already installed");
    }
    Ok(guard)
}
