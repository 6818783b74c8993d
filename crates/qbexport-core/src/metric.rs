use std::fmt;

/// A single field value of a line-protocol record.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Integer(i64),
    Float(f64),
    Boolean(bool),
    String(String),
}

impl From<i64> for FieldValue {
    fn from(value: i64) -> Self {
        FieldValue::Integer(value)
    }
}

impl From<f64> for FieldValue {
    fn from(value: f64) -> Self {
        FieldValue::Float(value)
    }
}

impl From<bool> for FieldValue {
    fn from(value: bool) -> Self {
        FieldValue::Boolean(value)
    }
}

impl From<&str> for FieldValue {
    fn from(value: &str) -> Self {
        FieldValue::String(value.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(value: String) -> Self {
        FieldValue::String(value)
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Integer(v) => write!(f, "{v}i"),
            FieldValue::Float(v) => write!(f, "{v}"),
            FieldValue::Boolean(v) => write!(f, "{v}"),
            FieldValue::String(v) => {
                let escaped = v.replace('\\', "\\\\").replace('"', "\\\"");
                write!(f, "\"{escaped}\"")
            }
        }
    }
}

/// One named, tagged, timestamped row.
///
/// Tags and fields keep insertion order so the rendered line is stable
/// between scrapes. Callers must not repeat a key.
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    name: String,
    tags: Vec<(String, String)>,
    fields: Vec<(String, FieldValue)>,
    timestamp: Option<i64>,
}

impl Metric {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tags: Vec::new(),
            fields: Vec::new(),
            timestamp: None,
        }
    }

    pub fn add_tag(&mut self, key: impl Into<String>, value: impl Into<String>) -> &mut Self {
        self.tags.push((key.into(), value.into()));
        self
    }

    pub fn add_value(&mut self, key: impl Into<String>, value: impl Into<FieldValue>) -> &mut Self {
        self.fields.push((key.into(), value.into()));
        self
    }

    /// Sets the nanosecond epoch timestamp shared by a whole snapshot.
    pub fn with_timestamp(&mut self, ts: i64) -> &mut Self {
        self.timestamp = Some(ts);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tags(&self) -> &[(String, String)] {
        &self.tags
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    pub fn fields(&self) -> &[(String, FieldValue)] {
        &self.fields
    }

    pub fn field(&self, key: &str) -> Option<&FieldValue> {
        self.fields.iter().find(|(k, _)| k == key).map(|(_, v)| v)
    }

    pub fn timestamp(&self) -> Option<i64> {
        self.timestamp
    }

    /// Renders the record as one line, without the trailing newline.
    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&escape_measurement(&self.name))?;
        for (key, value) in &self.tags {
            write!(f, ",{}={}", escape_key(key), escape_key(value))?;
        }

        let fields = self
            .fields
            .iter()
            .map(|(key, value)| format!("{}={value}", escape_key(key)))
            .collect::<Vec<_>>()
            .join(",");
        write!(f, " {fields}")?;

        debug_assert!(self.timestamp.is_some(), "metric {} has no timestamp", self.name);
        if let Some(ts) = self.timestamp {
            write!(f, " {ts}")?;
        }
        Ok(())
    }
}

fn escape_measurement(value: &str) -> String {
    value.replace(',', "\\,").replace(' ', "\\ ")
}

// A run of backslashes is doubled only where a reader would otherwise take
// it as escaping the separator that follows, or the end of the value.
fn escape_key(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    let mut run = 0;
    for ch in value.chars() {
        if ch == '\\' {
            run += 1;
            continue;
        }
        let special = matches!(ch, ',' | '=' | ' ');
        push_backslashes(&mut out, run, special);
        run = 0;
        if special {
            out.push('\\');
        }
        out.push(ch);
    }
    push_backslashes(&mut out, run, true);
    out
}

fn push_backslashes(out: &mut String, run: usize, double: bool) {
    let count = if double { run * 2 } else { run };
    out.extend(std::iter::repeat('\\').take(count));
}

/// Append-only, ordered set of metrics forming one response body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricCollection {
    metrics: Vec<Metric>,
}

impl MetricCollection {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, metric: Metric) {
        self.metrics.push(metric);
    }

    pub fn extend(&mut self, other: MetricCollection) {
        self.metrics.extend(other.metrics);
    }

    pub fn len(&self) -> usize {
        self.metrics.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metrics.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Metric> {
        self.metrics.iter()
    }

    pub fn render(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for MetricCollection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for metric in &self.metrics {
            writeln!(f, "{metric}")?;
        }
        Ok(())
    }
}

impl IntoIterator for MetricCollection {
    type Item = Metric;
    type IntoIter = std::vec::IntoIter<Metric>;

    fn into_iter(self) -> Self::IntoIter {
        self.metrics.into_iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn renders_measurement_tags_fields_and_timestamp() {
        let mut metric = Metric::new("qbittorrent_torrent");
        metric
            .add_tag("state", "downloading")
            .add_tag("category", "linux")
            .add_value("uploaded", 12_i64)
            .add_value("ratio", 0.5)
            .add_value("queueing", false)
            .add_value("label", "a \"b\"")
            .with_timestamp(1_700_000_000_000_000_000);

        assert_eq!(
            metric.render(),
            "qbittorrent_torrent,state=downloading,category=linux \
             uploaded=12i,ratio=0.5,queueing=false,label=\"a \\\"b\\\"\" 1700000000000000000"
        );
    }

    #[test]
    fn escapes_separators_in_tags_and_measurement() {
        let mut metric = Metric::new("my metric,x");
        metric
            .add_tag("name", "Big Buck Bunny, 1080p=yes")
            .add_value("dht_nodes", 3_i64)
            .with_timestamp(1);

        assert_eq!(
            metric.render(),
            "my\\ metric\\,x,name=Big\\ Buck\\ Bunny\\,\\ 1080p\\=yes dht_nodes=3i 1"
        );
    }

    #[test]
    fn trailing_backslash_in_tag_does_not_escape_the_next_separator() {
        let mut metric = Metric::new("m");
        metric
            .add_tag("name", "C:\\dl\\")
            .add_tag("hash", "h1")
            .add_tag("path", "a\\ b")
            .add_value("v", 1_i64)
            .with_timestamp(1);

        let line = metric.render();

        assert_eq!(line, "m,name=C:\\dl\\\\,hash=h1,path=a\\\\\\ b v=1i 1");
        assert!(!line.contains("C:\\dl\\,hash="));
    }

    #[test]
    fn inner_backslashes_in_tags_are_kept_verbatim() {
        let mut metric = Metric::new("m");
        metric.add_tag("client", "Evil\\\\Client").add_value("v", 1_i64).with_timestamp(1);

        assert_eq!(metric.render(), "m,client=Evil\\\\Client v=1i 1");
    }

    #[test]
    fn string_fields_escape_backslashes() {
        let mut metric = Metric::new("m");
        metric.add_value("path", "C:\\data").with_timestamp(7);

        assert_eq!(metric.render(), "m path=\"C:\\\\data\" 7");
    }

    #[test]
    fn float_fields_render_without_trailing_zeroes() {
        assert_eq!(FieldValue::from(1.0).to_string(), "1");
        assert_eq!(FieldValue::from(0.25).to_string(), "0.25");
        assert_eq!(FieldValue::from(true).to_string(), "true");
    }

    #[test]
    fn collection_renders_one_line_per_metric_in_insertion_order() {
        let mut collection = MetricCollection::new();
        for name in ["b", "a"] {
            let mut metric = Metric::new(name);
            metric.add_value("v", 1_i64).with_timestamp(5);
            collection.push(metric);
        }

        assert_eq!(collection.len(), 2);
        assert_eq!(collection.render(), "b v=1i 5\na v=1i 5\n");
        assert_eq!(MetricCollection::new().render(), "");
    }
}
