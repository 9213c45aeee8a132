use std::collections::HashMap;

use crate::{CatalogEvent, Error, Result, SourceEvent};

/// 校验失败的目录记录
#[derive(Debug)]
pub struct RejectedEvent {
    /// 记录在目录中的位置
    pub position: usize,
    pub id: String,
    pub error: Error,
}

/// 活动目录的只读快照
#[derive(Debug, Default)]
pub struct EventCatalog {
    events: Vec<SourceEvent>,
    by_id: HashMap<String, usize>,
    rejected: Vec<RejectedEvent>,
}

impl EventCatalog {
    /// 解析 JSON 数组；单条记录不合法时记录下来并跳过
    pub fn from_json(content: &str) -> Result<Self> {
        let raw: Vec<CatalogEvent> = serde_json::from_str(content)?;
        Ok(Self::from_records(raw))
    }

    pub fn from_records(records: impl IntoIterator<Item = CatalogEvent>) -> Self {
        let mut catalog = Self::default();

        for (position, record) in records.into_iter().enumerate() {
            let id = record.id.clone();
            match SourceEvent::try_from(record) {
                Ok(event) => {
                    if catalog.by_id.contains_key(&event.id) {
                        tracing::warn!("目录中存在重复的活动ID {}，保留第一条", event.id);
                        continue;
                    }
                    catalog.by_id.insert(event.id.clone(), catalog.events.len());
                    catalog.events.push(event);
                }
                Err(error) => {
                    tracing::warn!("跳过无效的目录记录 #{} ({}): {}", position, id, error);
                    catalog.rejected.push(RejectedEvent {
                        position,
                        id,
                        error,
                    });
                }
            }
        }

        catalog
    }

    pub fn get(&self, id: &str) -> Option<&SourceEvent> {
        self.by_id.get(id).map(|&i| &self.events[i])
    }

    pub fn events(&self) -> &[SourceEvent] {
        &self.events
    }

    pub fn rejected(&self) -> &[RejectedEvent] {
        &self.rejected
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CATALOG: &str = r#"[
        {"id": "1", "title": "Jazz by the Bay", "date": "2024-07-15", "time": "19:30",
         "location": "Marina Bay Sands", "description": "Live jazz"},
        {"id": "2", "title": "Hawker Food Tour", "date": "2024-07-16", "time": "12:00",
         "location": "Lau Pa Sat"},
        {"id": "3", "title": "Broken", "date": "next week", "time": "12:00"},
        {"id": "1", "title": "Duplicate", "date": "2024-07-17", "time": "09:00"},
        {"id": "4", "title": "Startup Pitch", "date": "2024-07-18", "time": "18:00",
         "duration_minutes": 90}
    ]"#;

    #[test]
    fn test_catalog_parsing() {
        let catalog = EventCatalog::from_json(CATALOG).unwrap();

        assert_eq!(catalog.len(), 3);
        assert_eq!(catalog.get("1").unwrap().title, "Jazz by the Bay");
        assert_eq!(catalog.get("2").unwrap().description, None);
        assert_eq!(
            catalog.get("4").unwrap().duration,
            Some(chrono::Duration::minutes(90))
        );
        assert!(catalog.get("3").is_none());

        assert_eq!(catalog.rejected().len(), 1);
        assert_eq!(catalog.rejected()[0].position, 2);
        assert!(matches!(
            catalog.rejected()[0].error,
            Error::InvalidEvent { field: "date", .. }
        ));
    }

    #[test]
    fn test_malformed_json() {
        assert!(matches!(
            EventCatalog::from_json("{\"id\": 1}"),
            Err(Error::Json(_))
        ));
    }
}
