//! Extra functions available to label expressions.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cel_interpreter::extractors::This;
use cel_interpreter::objects::Key;
use cel_interpreter::{Context, FunctionContext, ResolveResult, Value};
use chrono::{DateTime, FixedOffset};
use std::collections::HashMap;
use std::sync::Arc;
use x509_parser::extensions::GeneralName;

pub(super) fn register(context: &mut Context) {
    context.add_function("parseCert", parse_cert);
    context.add_function("base64Decode", base64_decode);
    context.add_function("format", format);
}

/// Type name of a value as CEL reports it
pub(super) fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Int(_) => "int",
        Value::UInt(_) => "uint",
        Value::Float(_) => "double",
        Value::String(_) => "string",
        Value::Bytes(_) => "bytes",
        Value::List(_) => "list",
        Value::Map(_) => "map",
        Value::Timestamp(_) => "timestamp",
        Value::Duration(_) => "duration",
        _ => "function",
    }
}

/// `parseCert(string|bytes) -> map`
///
/// Strings are base64 decoded first. PEM armor is removed before the DER
/// certificate is parsed.
fn parse_cert(ftx: &FunctionContext, This(input): This<Value>) -> ResolveResult {
    let raw = match input {
        Value::String(encoded) => STANDARD
            .decode(encoded.trim())
            .map_err(|e| ftx.error(format!("base64 decode failed: {e}")))?,
        Value::Bytes(bytes) => bytes.as_ref().clone(),
        other => {
            return Err(ftx.error(format!("unsupported type for parseCert: {}", kind(&other))));
        }
    };
    let fields = certificate_fields(&raw).map_err(|e| ftx.error(format!("parseCertificate failed: {e}")))?;
    Ok(Value::from(fields))
}

/// `base64Decode(string) -> bytes`
fn base64_decode(ftx: &FunctionContext, This(input): This<Arc<String>>) -> ResolveResult {
    STANDARD
        .decode(input.trim())
        .map(|bytes| Value::Bytes(Arc::new(bytes)))
        .map_err(|e| ftx.error(format!("base64 decode failed: {e}")))
}

/// `"<template>".format([args])` with `%s %d %f %v %%`
fn format(ftx: &FunctionContext, This(template): This<Arc<String>>, args: Value) -> ResolveResult {
    let Value::List(args) = args else {
        return Err(ftx.error(format!("format expects a list, got {}", kind(&args))));
    };
    format_template(&template, &args)
        .map(Value::from)
        .map_err(|e| ftx.error(e))
}

fn format_template(template: &str, args: &[Value]) -> Result<String, String> {
    let mut out = String::with_capacity(template.len());
    let mut args = args.iter();
    let mut chars = template.chars();

    while let Some(c) = chars.next() {
        if c != '%' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('%') => out.push('%'),
            Some(verb @ ('s' | 'v' | 'd' | 'f')) => {
                let arg = args
                    .next()
                    .ok_or_else(|| format!("missing argument for %{verb}"))?;
                out.push_str(&format_arg(verb, arg)?);
            }
            Some(verb) => return Err(format!("unsupported verb %{verb}")),
            None => return Err("format string ends with %".to_string()),
        }
    }

    if args.next().is_some() {
        return Err("too many arguments for format string".to_string());
    }
    Ok(out)
}

fn format_arg(verb: char, arg: &Value) -> Result<String, String> {
    match (verb, arg) {
        ('d', Value::Int(n)) => Ok(n.to_string()),
        ('d', Value::UInt(n)) => Ok(n.to_string()),
        ('f', Value::Float(n)) => Ok(format!("{n:.6}")),
        ('f', Value::Int(n)) => Ok(format!("{:.6}", *n as f64)),
        ('f', Value::UInt(n)) => Ok(format!("{:.6}", *n as f64)),
        ('s' | 'v', value) => Ok(display(value)),
        (verb, value) => Err(format!("%{verb} cannot format {}", kind(value))),
    }
}

fn display(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Int(n) => n.to_string(),
        Value::UInt(n) => n.to_string(),
        Value::Float(n) => n.to_string(),
        Value::String(s) => s.to_string(),
        Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
        Value::List(items) => {
            let items: Vec<String> = items.iter().map(display).collect();
            format!("[{}]", items.join(", "))
        }
        Value::Map(map) => {
            let mut entries: Vec<(String, String)> = map
                .map
                .iter()
                .map(|(key, value)| (display_key(key), display(value)))
                .collect();
            entries.sort();
            let entries: Vec<String> = entries
                .into_iter()
                .map(|(key, value)| format!("{key}: {value}"))
                .collect();
            format!("{{{}}}", entries.join(", "))
        }
        Value::Timestamp(ts) => ts.to_rfc3339(),
        Value::Duration(d) => format!("{}s", d.num_seconds()),
        other => kind(other).to_string(),
    }
}

fn display_key(key: &Key) -> String {
    match key {
        Key::Int(n) => n.to_string(),
        Key::Uint(n) => n.to_string(),
        Key::Bool(b) => b.to_string(),
        Key::String(s) => s.to_string(),
    }
}

/// Fields exposed for a certificate
fn certificate_fields(raw: &[u8]) -> Result<HashMap<String, Value>, String> {
    let pem;
    let der = if is_pem(raw) {
        let (_, parsed) = x509_parser::pem::parse_x509_pem(raw).map_err(|e| e.to_string())?;
        pem = parsed;
        pem.contents.as_slice()
    } else {
        raw
    };

    let (_, cert) = x509_parser::parse_x509_certificate(der).map_err(|e| e.to_string())?;

    let common_name = cert
        .subject()
        .iter_common_name()
        .next()
        .and_then(|cn| cn.as_str().ok())
        .unwrap_or_default()
        .to_string();

    let dns_names: Vec<Value> = match cert.subject_alternative_name() {
        Ok(Some(san)) => san
            .value
            .general_names
            .iter()
            .filter_map(|name| match name {
                GeneralName::DNSName(dns) => Some(Value::from((*dns).to_string())),
                _ => None,
            })
            .collect(),
        Ok(None) => Vec::new(),
        Err(e) => return Err(e.to_string()),
    };

    let is_ca = match cert.basic_constraints() {
        Ok(constraints) => constraints.is_some_and(|c| c.value.ca),
        Err(e) => return Err(e.to_string()),
    };

    let validity = cert.validity();
    let mut fields = HashMap::new();
    fields.insert("subject".to_string(), Value::from(cert.subject().to_string()));
    fields.insert("issuer".to_string(), Value::from(cert.issuer().to_string()));
    fields.insert("commonName".to_string(), Value::from(common_name));
    fields.insert("serialNumber".to_string(), Value::from(cert.serial.to_string()));
    fields.insert(
        "notBefore".to_string(),
        Value::Timestamp(timestamp(validity.not_before.timestamp())?),
    );
    fields.insert(
        "notAfter".to_string(),
        Value::Timestamp(timestamp(validity.not_after.timestamp())?),
    );
    fields.insert("dnsNames".to_string(), Value::List(Arc::new(dns_names)));
    fields.insert("isCA".to_string(), Value::Bool(is_ca));
    Ok(fields)
}

fn is_pem(raw: &[u8]) -> bool {
    raw.trim_ascii_start().starts_with(b"-----BEGIN")
}

fn timestamp(secs: i64) -> Result<DateTime<FixedOffset>, String> {
    DateTime::from_timestamp(secs, 0)
        .map(|ts| ts.fixed_offset())
        .ok_or_else(|| format!("timestamp {secs} out of range"))
}

#[cfg(test)]
#[path = "functions_test.rs"]
mod tests;
