use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// A recovered render condition: the card kept rendering, the element was
/// skipped or replaced with a fallback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderEvent {
    pub card: String,
    pub element: String,
    pub cause: String,
}

/// Shared warning collector. Clones share state, so one log can follow a
/// whole batch across worker threads.
#[derive(Clone)]
pub struct RenderLog {
    inner: Arc<Mutex<LogState>>,
}

struct LogState {
    events: Vec<RenderEvent>,
    counters: HashMap<String, u64>,
    sink: Option<BufWriter<File>>,
}

impl RenderLog {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(LogState {
                events: Vec::new(),
                counters: HashMap::new(),
                sink: None,
            })),
        }
    }

    /// Mirrors every event as a JSON line into `path`.
    pub fn with_file(path: impl AsRef<Path>) -> io::Result<Self> {
        let file = File::create(path)?;
        Ok(Self {
            inner: Arc::new(Mutex::new(LogState {
                events: Vec::new(),
                counters: HashMap::new(),
                sink: Some(BufWriter::new(file)),
            })),
        })
    }

    pub fn warn(&self, card: &str, element: &str, cause: &str) {
        eprintln!("[cardpress][{element}] card {card}: {cause}");
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(format!("warn.{element}")).or_insert(0);
            *entry = entry.saturating_add(1);
            if let Some(sink) = state.sink.as_mut() {
                let _ = writeln!(
                    sink,
                    "{{\"type\":\"render.warn\",\"card\":\"{}\",\"element\":\"{}\",\"cause\":\"{}\"}}",
                    json_escape(card),
                    json_escape(element),
                    json_escape(cause)
                );
            }
            state.events.push(RenderEvent {
                card: card.to_string(),
                element: element.to_string(),
                cause: cause.to_string(),
            });
        }
    }

    pub fn increment(&self, key: &str, amount: u64) {
        if let Ok(mut state) = self.inner.lock() {
            let entry = state.counters.entry(key.to_string()).or_insert(0);
            *entry = entry.saturating_add(amount);
        }
    }

    pub fn events(&self) -> Vec<RenderEvent> {
        self.inner
            .lock()
            .map(|state| state.events.clone())
            .unwrap_or_default()
    }

    pub fn count(&self, key: &str) -> u64 {
        self.inner
            .lock()
            .ok()
            .and_then(|state| state.counters.get(key).copied())
            .unwrap_or(0)
    }

    /// Writes a one-line counter summary to the sink and resets the counters.
    pub fn emit_summary(&self, context: &str) {
        if let Ok(mut state) = self.inner.lock() {
            let mut counters: Vec<(String, u64)> = state.counters.drain().collect();
            counters.sort_by(|a, b| a.0.cmp(&b.0));
            let counts_json = if counters.is_empty() {
                "{}".to_string()
            } else {
                let mut out = String::from("{");
                for (idx, (key, value)) in counters.iter().enumerate() {
                    if idx > 0 {
                        out.push(',');
                    }
                    out.push_str(&format!("\"{}\":{}", json_escape(key), value));
                }
                out.push('}');
                out
            };
            let json = format!(
                "{{\"type\":\"render.summary\",\"context\":\"{}\",\"counts\":{}}}",
                json_escape(context),
                counts_json
            );
            if let Some(sink) = state.sink.as_mut() {
                let _ = writeln!(sink, "{json}");
            }
        }
    }

    pub fn flush(&self) {
        if let Ok(mut state) = self.inner.lock() {
            if let Some(sink) = state.sink.as_mut() {
                let _ = sink.flush();
            }
        }
    }
}

impl Default for RenderLog {
    fn default() -> Self {
        Self::new()
    }
}

pub(crate) fn json_escape(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len() + 8);
    for ch in raw.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}
