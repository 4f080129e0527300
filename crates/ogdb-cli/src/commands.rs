use std::fmt::Write as _;
use std::fs;
use std::path::Path;

use anyhow::Context;
use colored::Colorize;
use ogdb_format::{FieldFormat, ObjectHeader, RawClassSpec, ReadBuffer, SchemaCodec, SlotFormat};
use ogdb_marshal::registry::resolve_spec;
use ogdb_marshal::{HandlerRegistry, MarshalConfig, MarshalEnv, QueryingReadContext, Value};
use ogdb_types::ClassId;
use serde::Serialize;
use tracing::debug;

use crate::cli::*;

pub fn run_command(cli: Cli) -> anyhow::Result<()> {
    let format = cli.format;
    let output = match cli.command {
        Command::Header(args) => header(&read_file(&args.file)?, args.hex, &format)?,
        Command::Schema(args) => schema(&read_file(&args.file)?, args.field_format.into(), &format)?,
        Command::Decode(args) => decode(
            &read_file(&args.schema)?,
            &read_file(&args.object)?,
            args.field_format.into(),
            &format,
        )?,
        Command::Formats => formats(&format)?,
        Command::Config(args) => config(args.file.as_deref(), &format)?,
    };
    println!("{output}");
    Ok(())
}

fn read_file(path: &Path) -> anyhow::Result<Vec<u8>> {
    let bytes = fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    debug!(path = %path.display(), len = bytes.len(), "slot file read");
    Ok(bytes)
}

#[derive(Serialize)]
struct HeaderReport {
    class_id: ClassId,
    version: Option<u8>,
    format: SlotFormat,
    field_count: usize,
    absent: Vec<usize>,
    payload_start: usize,
    slot_length: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    hex: Option<String>,
}

pub fn header(bytes: &[u8], hex_dump: bool, format: &OutputFormat) -> anyhow::Result<String> {
    let header = ObjectHeader::read(&mut ReadBuffer::new(bytes.to_vec()))
        .context("decoding object header")?;
    let report = HeaderReport {
        class_id: header.class_id,
        version: header.version,
        format: header.format,
        field_count: header.field_count(),
        absent: (0..header.field_count()).filter(|&i| header.is_null(i)).collect(),
        payload_start: header.payload_start,
        slot_length: bytes.len(),
        hex: hex_dump.then(|| hex::encode(bytes)),
    };
    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(&report)?);
    }

    let mut out = String::new();
    writeln!(out, "{} {}", "class:".bold(), report.class_id)?;
    let version = report.version.map_or("none".to_string(), |v| v.to_string());
    writeln!(out, "{} {} ({:?})", "version:".bold(), version, report.format)?;
    writeln!(out, "{} {}", "fields:".bold(), report.field_count)?;
    let absent: Vec<String> = report.absent.iter().map(usize::to_string).collect();
    writeln!(out, "{} [{}]", "absent:".bold(), absent.join(", "))?;
    write!(out, "{} {} of {} bytes", "payload:".bold(), report.payload_start, report.slot_length)?;
    if let Some(hex) = &report.hex {
        write!(out, "\n{} {}", "hex:".bold(), hex.dimmed())?;
    }
    Ok(out)
}

fn read_schema(bytes: &[u8], field_format: FieldFormat, handlers: &HandlerRegistry) -> anyhow::Result<RawClassSpec> {
    SchemaCodec::new(field_format)
        .read(&mut ReadBuffer::new(bytes.to_vec()), handlers)
        .context("decoding schema slot")
}

pub fn schema(bytes: &[u8], field_format: FieldFormat, format: &OutputFormat) -> anyhow::Result<String> {
    let spec = read_schema(bytes, field_format, &HandlerRegistry::with_builtins())?;
    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(&spec)?);
    }

    let mut out = String::new();
    write!(out, "{} {}", "class".bold(), spec.name.cyan())?;
    if let Some(ancestor) = spec.ancestor {
        write!(out, " extends {ancestor}")?;
    }
    if let Some(index) = spec.index {
        write!(out, " (index {index})")?;
    }
    for field in &spec.fields {
        write!(out, "\n  {}", field.name.yellow())?;
        if field.is_virtual {
            write!(out, " virtual")?;
            continue;
        }
        match field.handler {
            Some(handler) => write!(out, " handler {handler}")?,
            None => write!(out, " {:?}", field.kind)?,
        }
        if let Some(index) = field.index {
            write!(out, " index {index}")?;
        }
    }
    Ok(out)
}

/// Decode an object slot against the schema slot of its class.
///
/// References are shown as the ids they hold; nothing else is resolved.
pub fn decode(
    schema_bytes: &[u8],
    object_bytes: &[u8],
    field_format: FieldFormat,
    format: &OutputFormat,
) -> anyhow::Result<String> {
    let header = ObjectHeader::read(&mut ReadBuffer::new(object_bytes.to_vec()))
        .context("decoding object header")?;
    let handlers = HandlerRegistry::with_builtins();
    let spec = read_schema(schema_bytes, field_format, &handlers)?;
    let class = resolve_spec(header.class_id, spec, &handlers, &handlers)?;

    let env = MarshalEnv::in_memory().with_config(MarshalConfig {
        field_format,
        ..MarshalConfig::default()
    });
    env.schema.register(class.clone())?;
    let id = env.store.reserve_id()?;
    let slot = env.store.allocate_new(id, object_bytes.len())?;
    env.store.write(id, slot, object_bytes)?;
    let mut ctx = QueryingReadContext::open(&env, None, id)?
        .with_context(|| format!("class {} did not resolve", header.class_id))?;

    let mut fields = Vec::with_capacity(class.field_count());
    for field in &class.fields {
        fields.push((field.name.clone(), render(&ctx.read_field(&field.name)?)));
    }

    if let OutputFormat::Json = format {
        let fields: serde_json::Map<String, serde_json::Value> = fields
            .into_iter()
            .map(|(name, value)| (name, serde_json::Value::String(value)))
            .collect();
        return Ok(serde_json::to_string_pretty(&serde_json::json!({
            "class": class.name,
            "class_id": header.class_id,
            "fields": fields,
        }))?);
    }
    let mut out = format!("{} {}", class.name.cyan().bold(), header.class_id);
    for (name, value) in fields {
        write!(out, "\n  {} = {}", name.yellow(), value)?;
    }
    Ok(out)
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => "absent".into(),
        Value::Bool(b) => b.to_string(),
        Value::Byte(b) => b.to_string(),
        Value::Int(i) => i.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Str(s) => format!("{s:?}"),
        Value::Bytes(b) => format!("0x{}", hex::encode(b)),
        Value::IntArray(items) => format!("{items:?}"),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(render).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Stub(id) => format!("-> {id}"),
        Value::Ref(r) => format!("-> {r}"),
    }
}

#[derive(Serialize)]
struct FormatReport {
    version: u8,
    version_aware: bool,
    indirection: &'static str,
    current: bool,
}

pub fn formats(format: &OutputFormat) -> anyhow::Result<String> {
    let reports: Vec<FormatReport> = SlotFormat::HISTORICAL
        .iter()
        .copied()
        .chain(std::iter::once(SlotFormat::current()))
        .map(|f| FormatReport {
            version: f.version(),
            version_aware: f.is_version_aware(),
            indirection: match f {
                SlotFormat::V0 => "none",
                SlotFormat::V2 => "slot-relative",
                SlotFormat::Current => "payload-relative",
            },
            current: f == SlotFormat::current(),
        })
        .collect();
    if let OutputFormat::Json = format {
        return Ok(serde_json::to_string_pretty(&reports)?);
    }
    let lines: Vec<String> = reports
        .iter()
        .map(|r| {
            let marker = if r.current { "*".green().bold().to_string() } else { " ".into() };
            format!("{marker} v{}  indirection: {}", r.version, r.indirection)
        })
        .collect();
    Ok(lines.join("\n"))
}

pub fn config(file: Option<&Path>, format: &OutputFormat) -> anyhow::Result<String> {
    let config = match file {
        Some(path) => {
            let text = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
            MarshalConfig::from_toml_str(&text)?
        }
        None => MarshalConfig::default(),
    };
    Ok(match format {
        OutputFormat::Json => serde_json::to_string_pretty(&config)?,
        OutputFormat::Text => config.to_toml_string()?,
    })
}
