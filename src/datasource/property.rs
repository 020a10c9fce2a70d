use super::*;
use crate::{logging, utils};
use std::sync::{Mutex, PoisonError};

/// PropertyConverter func is to convert source message string to the specific property, that is, the sentinel rules.
/// if succeed to convert src, return Ok(Property)
/// if not, return the detailed error when convert src.
/// a blank src converts to an empty rule list
pub type PropertyConverter<P> = fn(src: &str) -> Result<Vec<Arc<P>>>;

/// `rule_json_array_parser` provide JSON as the default serialization for list of rules
pub fn rule_json_array_parser<P: SentinelRule + DeserializeOwned>(
    src: &str,
) -> Result<Vec<Arc<P>>> {
    if utils::is_blank(src) {
        return Ok(Vec::new());
    }
    let rules: Vec<P> = serde_json::from_str(src)?;
    Ok(rules.into_iter().map(Arc::new).collect())
}

/// `rule_yaml_array_parser` parses a YAML sequence of rules
pub fn rule_yaml_array_parser<P: SentinelRule + DeserializeOwned>(
    src: &str,
) -> Result<Vec<Arc<P>>> {
    if utils::is_blank(src) {
        return Ok(Vec::new());
    }
    let rules: Vec<P> = serde_yaml::from_str(src)?;
    Ok(rules.into_iter().map(Arc::new).collect())
}

/// PropertyUpdater is to update the specific properties to downstream.
/// returns whether the downstream changed, or the error if it failed to update.
pub type PropertyUpdater<P> = Box<dyn Fn(Vec<Arc<P>>) -> Result<bool> + Send + Sync>;

pub trait PropertyHandler<P: SentinelRule>: Send + Sync {
    /// check whether the current src is consistent with last update property
    fn is_property_consistent(&self, rules: &[Arc<P>]) -> bool;
    /// handle the current property, `None` means the property is absent
    fn handle(&self, src: Option<&str>) -> Result<bool>;
    /// update sentinel rules
    fn load(&self, rules: Vec<Arc<P>>) -> Result<bool>;
}

/// DefaultPropertyHandler encapsulate the Converter and updater of property.
/// One DefaultPropertyHandler instance is to handle one property type.
/// DefaultPropertyHandler should check whether current property is consistent with last update property
/// converter convert the message to the specific property
/// updater update the specific property to downstream.
pub struct DefaultPropertyHandler<P: SentinelRule + PartialEq + DeserializeOwned> {
    last_update_property: Mutex<Option<Vec<Arc<P>>>>,
    converter: PropertyConverter<P>,
    updater: PropertyUpdater<P>,
}

impl<P: SentinelRule + PartialEq + DeserializeOwned> DefaultPropertyHandler<P> {
    pub fn new(converter: PropertyConverter<P>, updater: PropertyUpdater<P>) -> Arc<Self> {
        Arc::new(Self {
            converter,
            updater,
            last_update_property: Mutex::new(None),
        })
    }

    fn record(&self, rules: Option<Vec<Arc<P>>>) {
        *self
            .last_update_property
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = rules;
    }
}

impl<P: SentinelRule + PartialEq + DeserializeOwned> PropertyHandler<P>
    for DefaultPropertyHandler<P>
{
    fn is_property_consistent(&self, rules: &[Arc<P>]) -> bool {
        match &*self
            .last_update_property
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
        {
            Some(last) => last.as_slice() == rules,
            None => false,
        }
    }

    fn handle(&self, src: Option<&str>) -> Result<bool> {
        match src {
            Some(src) => {
                let rules = (self.converter)(src).map_err(|err| {
                    logging::warn!(
                        "[DefaultPropertyHandler] Fail to convert source, reason: {:?}",
                        err
                    );
                    err
                })?;
                if self.is_property_consistent(&rules) {
                    return Ok(false);
                }
                let changed = (self.updater)(rules.clone())?;
                // only an applied property counts as the last one
                self.record(Some(rules));
                Ok(changed)
            }
            None => {
                let changed = (self.updater)(Vec::new())?;
                self.record(None);
                Ok(changed)
            }
        }
    }

    fn load(&self, rules: Vec<Arc<P>>) -> Result<bool> {
        (self.updater)(rules)
    }
}
