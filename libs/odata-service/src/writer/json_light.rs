//! JsonLight: a bare top-level object with `odata.*` annotations.
//!
//! Full metadata annotates every entry with its type, identity, ETag, edit
//! link and navigation links. Minimal metadata keeps only the
//! `odata.metadata` context URL. No metadata drops the context URL too; the
//! count and next link are data, not metadata, and are always written.

use super::json_verbose::common_primitive;
use super::{WriteContext, bag_item_type, failure};
use crate::format::JsonMetadata;
use crate::object_model::{ODataEntry, ODataExpanded, ODataFeed, ODataPayload, ODataProperty, ODataValue};
use odata_errors::ODataResult;
use serde_json::{Map, Value, json};

const METADATA: &str = "odata.metadata";
const COUNT: &str = "odata.count";
const NEXT_LINK: &str = "odata.nextLink";

/// # Errors
/// Never in practice; JSON values always serialize.
pub fn write(payload: &ODataPayload, level: JsonMetadata, ctx: &WriteContext<'_>) -> ODataResult<Vec<u8>> {
    let writer = LightWriter { level, ctx };
    let body = match payload {
        ODataPayload::Feed(feed) => {
            let mut object = writer.context(&feed.title);
            writer.feed_into(&mut object, feed, None);
            object
        }
        ODataPayload::Entry(entry) => {
            let mut object = writer.context(&format!("{}/@Element", entry.resource_set));
            writer.entry_into(&mut object, entry);
            object
        }
        ODataPayload::Property(property) => writer.top_level_property(property),
        ODataPayload::Url(url) => {
            let mut object = writer.context("");
            object.insert("url".to_owned(), Value::String(ctx.absolute(&url.url)));
            object
        }
        ODataPayload::Urls(urls) => {
            let mut object = writer.context("");
            if let Some(count) = urls.count {
                object.insert(COUNT.to_owned(), Value::String(count.to_string()));
            }
            let items: Vec<Value> = urls.urls.iter().map(|u| json!({ "url": ctx.absolute(&u.url) })).collect();
            object.insert("value".to_owned(), Value::Array(items));
            if let Some(next) = &urls.next_link {
                object.insert(NEXT_LINK.to_owned(), Value::String(next.clone()));
            }
            object
        }
        ODataPayload::ServiceDocument(doc) => {
            let mut object = writer.context("");
            let items: Vec<Value> = doc
                .collections
                .iter()
                .map(|name| json!({ "name": name, "url": name }))
                .collect();
            object.insert("value".to_owned(), Value::Array(items));
            object
        }
    };
    serde_json::to_vec(&Value::Object(body)).map_err(failure)
}

struct LightWriter<'c> {
    level: JsonMetadata,
    ctx: &'c WriteContext<'c>,
}

impl LightWriter<'_> {
    fn full(&self) -> bool {
        self.level == JsonMetadata::Full
    }

    /// A new object carrying `odata.metadata`, unless metadata is off.
    ///
    /// `fragment` is the default context; the write context may override it.
    fn context(&self, fragment: &str) -> Map<String, Value> {
        let mut object = Map::new();
        if self.level != JsonMetadata::None {
            let fragment = self.ctx.metadata_fragment.unwrap_or(fragment);
            let url = if fragment.is_empty() {
                format!("{}$metadata", self.ctx.service_root)
            } else {
                format!("{}$metadata#{fragment}", self.ctx.service_root)
            };
            object.insert(METADATA.to_owned(), Value::String(url));
        }
        object
    }

    fn feed_into(&self, object: &mut Map<String, Value>, feed: &ODataFeed, nav: Option<&str>) {
        let annotation = |name: &str| nav.map_or_else(|| name.to_owned(), |nav| format!("{nav}@{name}"));
        if nav.is_none()
            && let Some(count) = feed.row_count
        {
            object.insert(COUNT.to_owned(), Value::String(count.to_string()));
        }
        let entries: Vec<Value> = feed
            .entries
            .iter()
            .map(|e| {
                let mut inner = Map::new();
                self.entry_into(&mut inner, e);
                Value::Object(inner)
            })
            .collect();
        object.insert(nav.map_or_else(|| "value".to_owned(), str::to_owned), Value::Array(entries));
        if let Some(next) = &feed.next_link {
            object.insert(annotation(NEXT_LINK), Value::String(next.clone()));
        }
    }

    fn entry_into(&self, object: &mut Map<String, Value>, entry: &ODataEntry) {
        if self.full() {
            object.insert("odata.type".to_owned(), Value::String(entry.type_name.clone()));
            object.insert("odata.id".to_owned(), Value::String(entry.id.clone()));
            if let Some(etag) = &entry.etag {
                object.insert("odata.etag".to_owned(), Value::String(etag.clone()));
            }
            object.insert("odata.editLink".to_owned(), Value::String(entry.edit_link.clone()));
            if let Some(media) = &entry.media_link {
                object.insert("odata.mediaReadLink".to_owned(), Value::String(media.src.clone()));
                object.insert("odata.mediaContentType".to_owned(), Value::String(media.content_type.clone()));
            }
        }
        for property in &entry.properties.properties {
            object.insert(property.name.clone(), self.value(&property.type_name, &property.value));
        }
        for link in &entry.links {
            match &link.expanded {
                None => {}
                Some(ODataExpanded::Entry(None)) => {
                    object.insert(link.name.clone(), Value::Null);
                }
                Some(ODataExpanded::Entry(Some(inner))) => {
                    let mut nested = Map::new();
                    self.entry_into(&mut nested, inner);
                    object.insert(link.name.clone(), Value::Object(nested));
                }
                Some(ODataExpanded::Feed(feed)) => self.feed_into(object, feed, Some(&link.name)),
            }
            if self.full() {
                object.insert(
                    format!("{}@odata.navigationLinkUrl", link.name),
                    Value::String(self.ctx.absolute(&link.url)),
                );
            }
        }
        if self.full() {
            for stream in &entry.named_streams {
                object.insert(
                    format!("{}@odata.mediaReadLink", stream.name),
                    Value::String(self.ctx.absolute(&stream.src)),
                );
            }
        }
    }

    fn top_level_property(&self, property: &ODataProperty) -> Map<String, Value> {
        let fragment = match property.type_name.strip_prefix("Bag(") {
            Some(rest) => format!("Collection({rest}"),
            None => property.type_name.clone(),
        };
        let mut object = self.context(&fragment);
        match self.value(&property.type_name, &property.value) {
            Value::Object(fields) => object.extend(fields),
            other => {
                object.insert("value".to_owned(), other);
            }
        }
        object
    }

    fn value(&self, type_name: &str, value: &ODataValue) -> Value {
        match value {
            ODataValue::Null => Value::Null,
            ODataValue::Primitive(v) => common_primitive(v),
            ODataValue::Complex(content) => {
                let mut object = Map::new();
                if self.full() {
                    object.insert("odata.type".to_owned(), Value::String(type_name.to_owned()));
                }
                for inner in &content.properties {
                    object.insert(inner.name.clone(), self.value(&inner.type_name, &inner.value));
                }
                Value::Object(object)
            }
            ODataValue::Bag(items) => {
                let item_type = bag_item_type(type_name);
                Value::Array(items.iter().map(|item| self.value(item_type, item)).collect())
            }
        }
    }
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use crate::object_model::{ODataUrl, ODataUrlCollection, ObjectModelSerializer};
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};
    use odata_model::{EntityCollection, ProtocolVersion};

    const ROOT: &str = "http://localhost/svc/";

    fn products(level: JsonMetadata) -> Value {
        let wrapper = northwind_wrapper(northwind_config());
        let serializer = ObjectModelSerializer::new(&wrapper, ROOT);
        let set = wrapper.resolve_resource_set("Products").unwrap();
        let mut rows = EntityCollection::new(northwind_entities(&northwind_model())["Products"].clone());
        rows.count = Some(2);
        let feed = serializer
            .feed(&rows, &set, None, "Products", Some(format!("{ROOT}Products?$skiptoken=2")))
            .unwrap();
        let bytes = write(&ODataPayload::Feed(feed), level, &WriteContext::new(ROOT, ProtocolVersion::V3)).unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[test]
    fn minimal_metadata_has_only_the_context_url() {
        let doc = products(JsonMetadata::Minimal);
        assert_eq!(doc[METADATA], "http://localhost/svc/$metadata#Products");
        assert_eq!(doc[COUNT], "2");
        let first = doc["value"][0].as_object().unwrap();
        assert!(first.keys().all(|k| !k.starts_with("odata.")));
        assert_eq!(first["UnitPrice"], "18.00");
    }

    #[test]
    fn full_metadata_annotates_entries() {
        let doc = products(JsonMetadata::Full);
        let first = &doc["value"][0];
        assert_eq!(first["odata.type"], "NorthWind.Product");
        assert_eq!(first["odata.etag"], "W/\"7L\"");
        assert_eq!(first["odata.editLink"], "Products(1)");
    }

    #[test]
    fn no_metadata_keeps_count_and_next_link() {
        let doc = products(JsonMetadata::None);
        assert!(doc.get(METADATA).is_none());
        assert_eq!(doc[COUNT], "2");
        assert_eq!(doc[NEXT_LINK], "http://localhost/svc/Products?$skiptoken=2");
    }

    #[test]
    fn links_use_the_supplied_context() {
        let urls = ODataPayload::Urls(ODataUrlCollection {
            urls: vec![ODataUrl {
                url: "Orders(10643)".to_owned(),
            }],
            count: None,
            next_link: None,
        });
        let ctx = WriteContext::new(ROOT, ProtocolVersion::V3).with_metadata_fragment("Customers/$links/Orders");
        let bytes = write(&urls, JsonMetadata::Minimal, &ctx).unwrap();
        let doc: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(doc[METADATA], "http://localhost/svc/$metadata#Customers/$links/Orders");
        assert_eq!(doc["value"][0]["url"], "http://localhost/svc/Orders(10643)");
    }
}
