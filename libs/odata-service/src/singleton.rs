//! Singleton implementations, bound by name before the service starts.

use crate::query::QueryOptions;
use indexmap::IndexMap;
use odata_errors::{ODataError, ODataResult, messages};
use odata_model::singleton::validate_singleton_name;
use odata_model::{EntityInstance, MetadataProviderWrapper, PrimitiveValue, SingletonMetadata};
use odata_uri::parse_typed_literal;
use std::sync::Arc;

/// What a singleton hands back.
#[derive(Debug, Clone, PartialEq)]
pub enum SingletonValue {
    Entity(Option<EntityInstance>),
    Entities(Vec<EntityInstance>),
}

/// Typed arguments of one invocation, in declaration order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SingletonArgs {
    values: IndexMap<String, PrimitiveValue>,
}

impl SingletonArgs {
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&PrimitiveValue> {
        self.values.get(name)
    }

    #[must_use]
    pub fn str(&self, name: &str) -> Option<&str> {
        self.get(name).and_then(PrimitiveValue::as_str)
    }
}

pub type SingletonFn = Arc<dyn Fn(&SingletonArgs) -> ODataResult<SingletonValue> + Send + Sync>;

/// Name to implementation map. Filled while the service is assembled and
/// read-only afterwards.
#[derive(Clone, Default)]
pub struct SingletonRegistry {
    bound: IndexMap<String, SingletonFn>,
}

impl std::fmt::Debug for SingletonRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SingletonRegistry")
            .field("bound", &self.bound.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl SingletonRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind `f` to the singleton `name`.
    ///
    /// # Errors
    /// Reserved (`eval`, `exec`, `system`) and non-identifier names.
    pub fn register<F>(&mut self, name: &str, f: F) -> ODataResult<()>
    where
        F: Fn(&SingletonArgs) -> ODataResult<SingletonValue> + Send + Sync + 'static,
    {
        validate_singleton_name(name)?;
        self.bound.insert(name.to_owned(), Arc::new(f));
        Ok(())
    }

    /// Builder form of [`Self::register`].
    ///
    /// # Errors
    /// Same as [`Self::register`].
    pub fn with<F>(mut self, name: &str, f: F) -> ODataResult<Self>
    where
        F: Fn(&SingletonArgs) -> ODataResult<SingletonValue> + Send + Sync + 'static,
    {
        self.register(name, f)?;
        Ok(self)
    }

    #[must_use]
    pub fn is_bound(&self, name: &str) -> bool {
        self.bound.contains_key(name)
    }

    /// Declared singletons with no implementation bound.
    #[must_use]
    pub fn unbound<'w>(&self, wrapper: &'w MetadataProviderWrapper) -> Vec<&'w str> {
        wrapper
            .singletons()
            .into_iter()
            .map(SingletonMetadata::name)
            .filter(|name| !self.is_bound(name))
            .collect()
    }

    /// Invoke the implementation bound to `metadata`, with arguments taken
    /// from the custom query options named after its parameters.
    ///
    /// # Errors
    /// `501` when nothing is bound, `400` for missing or malformed arguments,
    /// `500` when the result does not match the declared return shape or type.
    pub fn invoke(
        &self,
        wrapper: &MetadataProviderWrapper,
        metadata: &SingletonMetadata,
        options: &QueryOptions,
    ) -> ODataResult<SingletonValue> {
        let name = metadata.name();
        let f = self
            .bound
            .get(name)
            .ok_or_else(|| ODataError::not_implemented(messages::singleton_not_bound(name)))?;

        let mut args = SingletonArgs::default();
        for parameter in metadata.parameters() {
            let text = options.custom(&parameter.name).ok_or_else(|| {
                ODataError::bad_request(messages::singleton_parameter_missing(name, &parameter.name))
            })?;
            args.values
                .insert(parameter.name.clone(), parse_typed_literal(text, parameter.kind)?);
        }

        tracing::debug!(singleton = name, args = args.values.len(), "invoking singleton");
        let value = f(&args)?;
        check_result(wrapper, metadata, &value)?;
        Ok(value)
    }
}

fn check_result(
    wrapper: &MetadataProviderWrapper,
    metadata: &SingletonMetadata,
    value: &SingletonValue,
) -> ODataResult<()> {
    let expected = wrapper.resource_type(metadata.return_type())?;
    let wrong = || {
        ODataError::internal(messages::singleton_returned_wrong_type(
            metadata.name(),
            expected.full_name(),
        ))
    };
    let entities: Vec<&EntityInstance> = match value {
        SingletonValue::Entity(_) if metadata.returns_collection() => return Err(wrong()),
        SingletonValue::Entities(_) if !metadata.returns_collection() => return Err(wrong()),
        SingletonValue::Entity(entity) => entity.iter().collect(),
        SingletonValue::Entities(entities) => entities.iter().collect(),
    };
    if entities
        .iter()
        .any(|e| !wrapper.is_assignable(expected.id(), e.type_id()))
    {
        return Err(wrong());
    }
    Ok(())
}

#[cfg(test)]
#[cfg_attr(coverage_nightly, coverage(off))]
mod tests {
    use super::*;
    use odata_model::testing::{northwind_config, northwind_entities, northwind_model, northwind_wrapper};

    fn registry() -> SingletonRegistry {
        let customers = northwind_entities(&northwind_model())["Customers"].clone();
        let by_country = customers.clone();
        SingletonRegistry::new()
            .with("TopCustomer", move |_| Ok(SingletonValue::Entity(customers.last().cloned())))
            .unwrap()
            .with("CustomersByCountry", move |args| {
                let country = args.str("country").unwrap_or_default().to_owned();
                Ok(SingletonValue::Entities(
                    by_country
                        .iter()
                        .filter(|c| c.primitive("Country").and_then(PrimitiveValue::as_str) == Some(country.as_str()))
                        .cloned()
                        .collect(),
                ))
            })
            .unwrap()
    }

    fn declared<'w>(wrapper: &'w MetadataProviderWrapper, name: &str) -> &'w SingletonMetadata {
        wrapper.singletons().into_iter().find(|s| s.name() == name).unwrap()
    }

    #[test]
    fn reserved_names_cannot_be_bound() {
        let mut registry = SingletonRegistry::new();
        for name in ["eval", "EXEC", "System", "not a name"] {
            assert!(registry.register(name, |_| Ok(SingletonValue::Entity(None))).is_err());
        }
    }

    #[test]
    fn arguments_come_from_custom_options() {
        let wrapper = northwind_wrapper(northwind_config());
        let options = QueryOptions::parse("country='Sweden'").unwrap();
        let value = registry()
            .invoke(&wrapper, declared(&wrapper, "CustomersByCountry"), &options)
            .unwrap();
        let SingletonValue::Entities(rows) = value else {
            panic!("expected a collection");
        };
        assert_eq!(rows.len(), 1);

        let missing = registry()
            .invoke(&wrapper, declared(&wrapper, "CustomersByCountry"), &QueryOptions::default())
            .unwrap_err();
        assert_eq!(missing.status().as_u16(), 400);
    }

    #[test]
    fn unbound_and_misshapen_results_fail() {
        let wrapper = northwind_wrapper(northwind_config());
        assert_eq!(SingletonRegistry::new().unbound(&wrapper), ["TopCustomer", "CustomersByCountry"]);
        let err = SingletonRegistry::new()
            .invoke(&wrapper, declared(&wrapper, "TopCustomer"), &QueryOptions::default())
            .unwrap_err();
        assert_eq!(err.status().as_u16(), 501);

        let wrong = SingletonRegistry::new()
            .with("TopCustomer", |_| Ok(SingletonValue::Entities(Vec::new())))
            .unwrap();
        let err = wrong
            .invoke(&wrapper, declared(&wrapper, "TopCustomer"), &QueryOptions::default())
            .unwrap_err();
        assert!(err.message().contains("TopCustomer"));
    }
}
