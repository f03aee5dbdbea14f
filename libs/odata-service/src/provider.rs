//! The data-access seam: what the processor asks of a query provider.

use odata_errors::{ODataError, ODataResult, messages};
use odata_model::{EntityInstance, ResourceProperty, ResourceSetWrapper};
use odata_uri::{FilterInfo, KeyPredicate, OrderByInfo, SkipTokenInfo};

/// Query parameters handed to a provider.
///
/// `filter` and `order_by` are always passed; a provider that does not
/// handle ordered paging may use `order_by` only to know which navigation
/// values the ordering reads. `skip`, `top` and `skip_token` are passed only
/// to providers that handle ordered paging.
#[derive(Debug, Clone, Copy, Default)]
pub struct QueryParams<'a> {
    pub filter: Option<&'a FilterInfo>,
    pub order_by: Option<&'a OrderByInfo>,
    pub skip: Option<u64>,
    pub top: Option<u64>,
    pub skip_token: Option<&'a SkipTokenInfo>,
    /// Report the total count after filtering, before paging.
    pub count: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub entities: Vec<EntityInstance>,
    pub count: Option<u64>,
    /// More entities follow the returned page.
    pub has_more: bool,
}

impl QueryResult {
    #[must_use]
    pub const fn new(entities: Vec<EntityInstance>) -> Self {
        Self {
            entities,
            count: None,
            has_more: false,
        }
    }
}

/// Source of entity data for one service.
///
/// Read hooks return entities of the set's type or a derived type. Write
/// hooks default to `501 Not Implemented`.
pub trait QueryProvider: Send + Sync {
    /// Whether the provider applies ordering, skiptoken, skip and top itself.
    fn handles_ordered_paging(&self) -> bool {
        false
    }

    /// # Errors
    /// Provider failures.
    fn resource_set(&self, set: &ResourceSetWrapper, params: &QueryParams<'_>) -> ODataResult<QueryResult>;

    /// # Errors
    /// Provider failures.
    fn resource_from_set(
        &self,
        set: &ResourceSetWrapper,
        key: &KeyPredicate,
    ) -> ODataResult<Option<EntityInstance>>;

    /// Entities reached through a collection-valued navigation property.
    ///
    /// # Errors
    /// Provider failures.
    fn related_resource_set(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        target_set: &ResourceSetWrapper,
        property: &ResourceProperty,
        params: &QueryParams<'_>,
    ) -> ODataResult<QueryResult>;

    /// The entity reached through a single-valued navigation property.
    ///
    /// # Errors
    /// Provider failures.
    fn related_resource(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        target_set: &ResourceSetWrapper,
        property: &ResourceProperty,
    ) -> ODataResult<Option<EntityInstance>>;

    /// One entity of a collection-valued navigation, by key.
    ///
    /// # Errors
    /// Provider failures.
    fn related_resource_by_key(
        &self,
        source_set: &ResourceSetWrapper,
        source: &EntityInstance,
        target_set: &ResourceSetWrapper,
        property: &ResourceProperty,
        key: &KeyPredicate,
    ) -> ODataResult<Option<EntityInstance>> {
        let related = self.related_resource_set(source_set, source, target_set, property, &QueryParams::default())?;
        Ok(related.entities.into_iter().find(|e| key.matches(e)))
    }

    /// Insert `entity` into `set`, returning it as stored.
    ///
    /// # Errors
    /// Provider failures; `501` when the provider is read-only.
    fn create(&self, set: &ResourceSetWrapper, entity: EntityInstance) -> ODataResult<EntityInstance> {
        let _ = entity;
        Err(read_only(set))
    }

    /// Replace (`replace`) or merge the properties of an existing entity.
    ///
    /// # Errors
    /// Provider failures; `501` when the provider is read-only.
    fn update(
        &self,
        set: &ResourceSetWrapper,
        key: &KeyPredicate,
        values: EntityInstance,
        replace: bool,
    ) -> ODataResult<Option<EntityInstance>> {
        let _ = (key, values, replace);
        Err(read_only(set))
    }

    /// Remove an entity; `false` when nothing matched the key.
    ///
    /// # Errors
    /// Provider failures; `501` when the provider is read-only.
    fn delete(&self, set: &ResourceSetWrapper, key: &KeyPredicate) -> ODataResult<bool> {
        let _ = key;
        Err(read_only(set))
    }
}

fn read_only(set: &ResourceSetWrapper) -> ODataError {
    ODataError::not_implemented(messages::provider_failure(format_args!(
        "the resource set '{}' is read-only",
        set.name()
    )))
}

/// Order, resume, skip and take in memory.
///
/// `entities` are already filtered. The count, when asked for, is taken
/// before paging.
#[must_use]
pub fn page_in_memory(mut entities: Vec<EntityInstance>, params: &QueryParams<'_>) -> QueryResult {
    let count = params.count.then(|| entities.len() as u64);
    if let Some(order_by) = params.order_by {
        order_by.sort(&mut entities);
        if let Some(token) = params.skip_token {
            entities.retain(|e| token.precedes(order_by, e));
        }
    }
    let skip = params.skip.map_or(0, saturating_usize);
    let mut entities: Vec<EntityInstance> = entities.into_iter().skip(skip).collect();
    let mut has_more = false;
    if let Some(top) = params.top.map(saturating_usize)
        && entities.len() > top
    {
        entities.truncate(top);
        has_more = true;
    }
    QueryResult {
        entities,
        count,
        has_more,
    }
}

fn saturating_usize(value: u64) -> usize {
    usize::try_from(value).unwrap_or(usize::MAX)
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_entities, northwind_model};
    use odata_model::MetadataProvider;

    fn customers() -> (Vec<EntityInstance>, OrderByInfo) {
        let model = northwind_model();
        let ty = model.resolve_resource_type("Customer").unwrap();
        let mut rows = northwind_entities(&model)["Customers"].clone();
        rows.reverse();
        (rows, OrderByInfo::from_keys(ty))
    }

    fn ids(result: &QueryResult) -> Vec<&str> {
        result
            .entities
            .iter()
            .map(|e| e.primitive("CustomerID").and_then(|v| v.as_str()).unwrap())
            .collect()
    }

    #[test]
    fn sorts_skips_and_takes() {
        let (rows, order_by) = customers();
        let params = QueryParams {
            order_by: Some(&order_by),
            skip: Some(1),
            top: Some(1),
            count: true,
            ..QueryParams::default()
        };
        let result = page_in_memory(rows, &params);
        assert_eq!(ids(&result), ["ANATR"]);
        assert_eq!(result.count, Some(3));
        assert!(result.has_more);
    }

    #[test]
    fn resumes_after_skip_token() {
        let (rows, order_by) = customers();
        let alfki = rows.iter().find(|e| e.primitive("CustomerID").and_then(|v| v.as_str()) == Some("ALFKI")).unwrap();
        let token = SkipTokenInfo::from_entity(&order_by, alfki);
        let params = QueryParams {
            order_by: Some(&order_by),
            skip_token: Some(&token),
            top: Some(5),
            ..QueryParams::default()
        };
        let result = page_in_memory(rows, &params);
        assert_eq!(ids(&result), ["ANATR", "BERGS"]);
        assert!(!result.has_more);
        assert_eq!(result.count, None);
    }
}
