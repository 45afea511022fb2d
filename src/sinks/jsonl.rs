use super::{EntitySink, GENERATOR};
use anyhow::Result;
use serde_json::{Value, json};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use crate::entity::{EntityKind, EntityRecord, HeaderMeta};

/// One JSON object per line: a header record first, then every forwarded
/// entity.
pub struct JsonlSink {
    writer: BufWriter<Box<dyn Write + Send>>,
}

impl JsonlSink {
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = File::create(path)?;
        Ok(Self::from_writer(Box::new(file)))
    }

    pub fn stdout() -> Self {
        Self::from_writer(Box::new(std::io::stdout()))
    }

    pub fn from_writer(writer: Box<dyn Write + Send>) -> Self {
        Self {
            writer: BufWriter::new(writer),
        }
    }

    fn write_value(&mut self, value: &Value) -> Result<()> {
        serde_json::to_writer(&mut self.writer, value)?;
        writeln!(self.writer)?;
        Ok(())
    }
}

impl EntitySink for JsonlSink {
    fn header(&mut self, header: &HeaderMeta) -> Result<()> {
        let record = json!({
            "type": "header",
            "generator": GENERATOR,
            "required_features": header.required_features,
            "optional_features": header.optional_features,
        });
        self.write_value(&record)
    }

    fn entity(&mut self, entity: &EntityRecord) -> Result<()> {
        let mut object = serde_json::Map::new();
        object.insert("type".to_string(), json!(entity.kind.label()));
        object.insert("id".to_string(), json!(entity.id));
        object.insert("version".to_string(), json!(entity.version));
        object.insert("uid".to_string(), json!(entity.uid));
        object.insert("user".to_string(), json!(entity.user));
        object.insert("tags".to_string(), json!(entity.tags));
        if let Some(timestamp) = &entity.timestamp {
            object.insert("timestamp".to_string(), json!(timestamp));
        }
        if let Some((lat, lon)) = entity.coord {
            object.insert("lat".to_string(), json!(lat));
            object.insert("lon".to_string(), json!(lon));
        }
        if entity.kind == EntityKind::Way {
            object.insert("refs".to_string(), json!(entity.refs));
        }
        if entity.kind == EntityKind::Relation {
            object.insert("members".to_string(), json!(entity.members));
        }
        self.write_value(&Value::Object(object))
    }

    fn finish(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;

    fn run_sink<F>(fill: F) -> Vec<Value>
    where
        F: FnOnce(&mut JsonlSink),
    {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        {
            let mut sink = JsonlSink::new(file.path()).unwrap();
            fill(&mut sink);
            sink.finish().unwrap();
        }
        let mut content = String::new();
        file.read_to_string(&mut content).unwrap();
        content
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }

    #[test]
    fn header_carries_generator_marker() {
        let lines = run_sink(|sink| {
            sink.header(&HeaderMeta {
                required_features: vec!["OsmSchema-V0.6".to_string()],
                optional_features: vec![],
            })
            .unwrap();
        });
        assert_eq!(lines[0]["type"], "header");
        assert_eq!(lines[0]["generator"], GENERATOR);
        assert_eq!(lines[0]["required_features"][0], "OsmSchema-V0.6");
    }

    #[test]
    fn way_record_keeps_refs_and_tags() {
        let lines = run_sink(|sink| {
            let mut way = EntityRecord::new(EntityKind::Way, 9);
            way.version = 3;
            way.refs = vec![1, 2, 3];
            way.tags
                .insert("highway".to_string(), "residential".to_string());
            sink.entity(&way).unwrap();
        });
        assert_eq!(lines[0]["type"], "way");
        assert_eq!(lines[0]["id"], 9);
        assert_eq!(lines[0]["version"], 3);
        assert_eq!(lines[0]["refs"], json!([1, 2, 3]));
        assert_eq!(lines[0]["tags"]["highway"], "residential");
    }
}
