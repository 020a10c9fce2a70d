use arc_swap::ArcSwapOption;
use std::sync::{Arc, PoisonError, RwLock};

/// `PropertyListener` is notified of the values of a `DynamicProperty`.
pub trait PropertyListener<T>: Send + Sync {
    /// called on every change of the value
    fn config_update(&self, value: &T);
    /// called once with the current value when the listener is added
    fn config_load(&self, value: &T);
}

/// `DynamicProperty` holds a value which may be replaced at any time,
/// and notifies its listeners of every change.
pub struct DynamicProperty<T> {
    value: ArcSwapOption<T>,
    listeners: RwLock<Vec<Arc<dyn PropertyListener<T>>>>,
}

impl<T> Default for DynamicProperty<T> {
    fn default() -> Self {
        DynamicProperty {
            value: ArcSwapOption::empty(),
            listeners: RwLock::new(Vec::new()),
        }
    }
}

impl<T: PartialEq> DynamicProperty<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self) -> Option<Arc<T>> {
        self.value.load_full()
    }

    /// `update_value` stores `value` and notifies the listeners,
    /// returns false without notifying if the value is unchanged.
    /// Updates and listener registrations are serialized, so every listener sees the latest value.
    /// Listeners must not call back into the property.
    pub fn update_value(&self, value: T) -> bool {
        let listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(current) = self.value.load().as_ref() {
            if **current == value {
                return false;
            }
        }
        let value = Arc::new(value);
        self.value.store(Some(Arc::clone(&value)));
        for listener in listeners.iter() {
            listener.config_update(&value);
        }
        true
    }

    pub fn add_listener(&self, listener: Arc<dyn PropertyListener<T>>) {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        listeners.push(Arc::clone(&listener));
        if let Some(value) = self.get() {
            listener.config_load(&value);
        }
    }

    pub fn remove_listener(&self, listener: &Arc<dyn PropertyListener<T>>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|l| !Arc::ptr_eq(l, listener));
    }

    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}
