use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, Utc};
use serde_json::Value;

use crate::entity::sync_position::SyncPosition;
use crate::entity::synced_record::NormalizedRecord;
use crate::source::{PageRequest, SourceClient, SourcePage};

use super::{DataHandler, HandlerError, HandlerPage, HandlerSettings};

/// Field-level knowledge of one record type.
///
/// [`PagedHandler`] does the paging and position bookkeeping; a mapper only
/// says how to read ids, timestamps and payloads out of raw items.
pub trait RecordMapper: Send + Sync {
    fn handler_id(&self) -> &'static str;

    /// Record-type discriminator stored on every record.
    fn record_type(&self) -> &'static str;

    /// Default resource path on the source.
    fn resource(&self) -> &'static str;

    /// Whether `max_age_days` applies to this record type.
    fn supports_timestamp_break(&self) -> bool {
        false
    }

    fn native_id(&self, item: &Value) -> Result<String, HandlerError> {
        native_id_field(item, "id")
    }

    fn occurred_at(&self, item: &Value) -> Option<DateTime<FixedOffset>>;

    /// Convert a raw item into the stored payload.
    fn payload(&self, native_id: &str, item: Value) -> Result<Value, HandlerError>;
}

/// Read an id that may be a string or a number.
pub fn native_id_field(item: &Value, field: &str) -> Result<String, HandlerError> {
    match item.get(field) {
        Some(Value::String(s)) if !s.is_empty() => Ok(s.clone()),
        Some(Value::Number(n)) => Ok(n.to_string()),
        _ => Err(HandlerError::transform(
            None,
            format!("item has no usable `{}` field", field),
        )),
    }
}

/// Read the first RFC 3339 timestamp found among `fields`.
pub fn timestamp_field(item: &Value, fields: &[&str]) -> Option<DateTime<FixedOffset>> {
    fields
        .iter()
        .filter_map(|field| item.get(*field).and_then(Value::as_str))
        .find_map(|s| DateTime::parse_from_rfc3339(s).ok())
}

/// Recursively drop `null` members from objects.
///
/// Sources pad their responses with absent optional fields; stored payloads
/// only keep what is actually present.
pub fn strip_null_values(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k, strip_null_values(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(strip_null_values).collect()),
        other => other,
    }
}

/// Walk one page of items against a position.
///
/// Items are visited in provider order (newest first). The first item seen in
/// a run that is not the break id becomes the future break id. Walking stops at the position's break id
/// or at the first item older than `cutoff`. The position advances to the next
/// cursor only when the page was full, the walk did not stop early, and the
/// source reported another page; otherwise it is finalized.
pub fn walk_page<M: RecordMapper + ?Sized>(
    mapper: &M,
    source: &str,
    page: SourcePage,
    mut position: SyncPosition,
    page_size: u32,
    cutoff: Option<DateTime<Utc>>,
) -> Result<HandlerPage, HandlerError> {
    let fetched = page.items.len();
    let mut records = Vec::with_capacity(fetched);
    let mut stopped = false;

    for item in page.items {
        let native_id = mapper.native_id(&item)?;
        if position.break_id.as_deref() == Some(native_id.as_str()) {
            stopped = true;
            break;
        }
        position.note_first_item(&native_id);

        let occurred_at = mapper.occurred_at(&item);
        if let (Some(cutoff), Some(at)) = (cutoff, occurred_at)
            && at < cutoff
        {
            stopped = true;
            break;
        }

        let payload = mapper.payload(&native_id, item)?;
        records.push(
            NormalizedRecord::new(source, native_id, mapper.record_type(), payload)
                .with_occurred_at(occurred_at),
        );
    }

    match page.next_cursor {
        Some(next) if !stopped && fetched >= page_size as usize => position.advance(next),
        _ => position.finalize(),
    }

    Ok(HandlerPage { records, position })
}

/// A [`DataHandler`] for any cursor-paginated, newest-first resource.
#[derive(Debug, Clone)]
pub struct PagedHandler<M> {
    mapper: M,
    settings: HandlerSettings,
}

impl<M: RecordMapper> PagedHandler<M> {
    pub fn new(mapper: M, settings: HandlerSettings) -> Self {
        Self { mapper, settings }
    }

    pub fn settings(&self) -> &HandlerSettings {
        &self.settings
    }

    fn request(&self, position: &SyncPosition) -> PageRequest {
        let resource = self
            .settings
            .resource
            .as_deref()
            .unwrap_or(self.mapper.resource());

        PageRequest::new(resource, self.settings.page_size)
            .with_cursor(position.this_ref.clone())
            .with_params(
                self.settings
                    .params
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect(),
            )
    }
}

#[async_trait]
impl<M: RecordMapper> DataHandler for PagedHandler<M> {
    fn id(&self) -> &str {
        self.mapper.handler_id()
    }

    async fn fetch_page(
        &self,
        api: &dyn SourceClient,
        position: SyncPosition,
    ) -> Result<HandlerPage, HandlerError> {
        let page = api.fetch_page(&self.request(&position)).await?;

        let cutoff = if self.mapper.supports_timestamp_break() {
            self.settings.cutoff(Utc::now())
        } else {
            None
        };

        walk_page(
            &self.mapper,
            api.source_id(),
            page,
            position,
            self.settings.page_size,
            cutoff,
        )
    }
}
