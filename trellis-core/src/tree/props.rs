//! Property and Event Reflection
//!
//! Declarative descriptions carry string-keyed properties; this module
//! routes them onto a concrete node family through the
//! [`PropertyTarget`] trait.
//!
//! # Name Resolution
//!
//! A property name is classified before dispatch:
//!
//! - `on:` prefix: the rest is an event name, taken literally.
//! - `on` followed by anything else: an event name, converted from
//!   camelCase (`onNotifyValue` subscribes to `notify-value`).
//! - `prop:` prefix: the rest is an attribute name, taken literally.
//! - anything else: an attribute name, converted from camelCase.
//!
//! The literal escapes exist for names the camelCase conversion cannot
//! express, such as attributes that really do contain uppercase letters.
//!
//! # Binding State
//!
//! [`Bindings`] holds the per-node binding state: the last value written
//! per attribute (rewrites of an equal value are skipped) and the live
//! subscription per event (installing a handler releases the previous
//! one, so each event name has at most one live subscription).

use std::collections::HashMap;
use std::fmt::Debug;

use crate::error::PropertyError;
use crate::reactive::{Effect, Runtime};

/// A resolved property name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyName {
    /// Subscribe a handler to this event.
    Event(String),

    /// Assign a value to this attribute.
    Attribute(String),
}

impl PropertyName {
    /// Classify and normalize a raw property name.
    pub fn parse(raw: &str) -> Self {
        if let Some(rest) = raw.strip_prefix("on:") {
            return PropertyName::Event(rest.to_string());
        }
        if let Some(rest) = raw.strip_prefix("prop:") {
            return PropertyName::Attribute(rest.to_string());
        }
        match raw.strip_prefix("on") {
            Some(rest) if !rest.is_empty() => PropertyName::Event(camel_to_kebab(rest)),
            _ => PropertyName::Attribute(camel_to_kebab(raw)),
        }
    }
}

/// Convert a camelCase name to kebab-case.
pub fn camel_to_kebab(name: &str) -> String {
    let mut out = String::with_capacity(name.len() + 4);
    for (i, ch) in name.chars().enumerate() {
        if ch.is_ascii_uppercase() {
            if i > 0 {
                out.push('-');
            }
            out.push(ch.to_ascii_lowercase());
        } else {
            out.push(ch);
        }
    }
    out
}

/// A node family that accepts attribute writes and event subscriptions.
///
/// Implementations report failures as [`PropertyError`]; the binding
/// layer never retries or reinterprets them.
pub trait PropertyTarget: Clone + Send + Sync + 'static {
    /// The attribute value representation of the node family.
    type Value: Clone + PartialEq + Send + Sync + 'static;

    /// An event handler accepted by the node family.
    type Handler: Send + 'static;

    /// A token identifying one live subscription.
    type Subscription: Send + 'static;

    /// Assign `value` to the attribute `name`.
    fn set_attribute(&self, name: &str, value: &Self::Value) -> Result<(), PropertyError>;

    /// Connect `handler` to the event `name`.
    fn subscribe(&self, name: &str, handler: Self::Handler)
        -> Result<Self::Subscription, PropertyError>;

    /// Release a subscription previously returned by
    /// [`subscribe`](PropertyTarget::subscribe).
    fn unsubscribe(&self, subscription: Self::Subscription);
}

/// One value a property can carry.
pub enum PropertyValue<T: PropertyTarget> {
    /// A plain value for an attribute.
    Attribute(T::Value),

    /// A handler for an event.
    Handler(T::Handler),
}

/// Binding state for one target node.
pub struct Bindings<T: PropertyTarget> {
    target: T,
    attributes: HashMap<String, T::Value>,
    subscriptions: HashMap<String, T::Subscription>,
}

impl<T: PropertyTarget> Bindings<T> {
    /// Create empty binding state for `target`.
    pub fn new(target: T) -> Self {
        Self {
            target,
            attributes: HashMap::new(),
            subscriptions: HashMap::new(),
        }
    }

    /// The bound node.
    pub fn target(&self) -> &T {
        &self.target
    }

    /// Apply one raw property.
    ///
    /// Dispatches on the parsed name: attribute names take values and
    /// event names take handlers; the other pairings are usage errors.
    pub fn apply(&mut self, raw: &str, value: PropertyValue<T>) -> Result<(), PropertyError> {
        match (PropertyName::parse(raw), value) {
            (PropertyName::Attribute(name), PropertyValue::Attribute(value)) => {
                self.assign(name, value)
            }
            (PropertyName::Event(name), PropertyValue::Handler(handler)) => {
                self.install(name, handler)
            }
            (PropertyName::Event(name), PropertyValue::Attribute(_)) => {
                Err(PropertyError::HandlerRequired(name))
            }
            (PropertyName::Attribute(name), PropertyValue::Handler(_)) => {
                Err(PropertyError::ValueRequired(name))
            }
        }
    }

    /// Write an attribute, skipping the write when the value is unchanged.
    pub fn assign(&mut self, name: String, value: T::Value) -> Result<(), PropertyError> {
        if self.attributes.get(&name) == Some(&value) {
            return Ok(());
        }
        self.target.set_attribute(&name, &value)?;
        self.attributes.insert(name, value);
        Ok(())
    }

    /// Connect a handler, releasing the previous subscription for the
    /// same event first.
    pub fn install(&mut self, name: String, handler: T::Handler) -> Result<(), PropertyError> {
        if let Some(previous) = self.subscriptions.remove(&name) {
            self.target.unsubscribe(previous);
        }
        let subscription = self.target.subscribe(&name, handler)?;
        self.subscriptions.insert(name, subscription);
        Ok(())
    }

    /// Release every live subscription and forget the value cache.
    pub fn clear(&mut self) {
        for (_, subscription) in self.subscriptions.drain() {
            self.target.unsubscribe(subscription);
        }
        self.attributes.clear();
    }
}

impl<T: PropertyTarget + Debug> Debug for Bindings<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Bindings")
            .field("target", &self.target)
            .field("attributes", &self.attributes.len())
            .field("subscriptions", &self.subscriptions.len())
            .finish()
    }
}

/// Bind a reactive value source to an attribute.
///
/// Runs an effect that re-assigns the attribute when the source changes;
/// writes of an equal value are skipped.
///
/// # Panics
///
/// Panics when `raw` resolves to an event name or when the target
/// rejects an assignment.
pub fn bind_attribute<T: PropertyTarget>(
    runtime: &Runtime,
    target: T,
    raw: &str,
    source: impl Fn() -> T::Value + Send + Sync + 'static,
) -> Effect {
    let name = match PropertyName::parse(raw) {
        PropertyName::Attribute(name) => name,
        PropertyName::Event(name) => {
            panic!("{}", PropertyError::HandlerRequired(name))
        }
    };

    let bindings = std::sync::Mutex::new(Bindings::new(target));
    runtime.create_effect(move || {
        let value = source();
        bindings
            .lock()
            .expect("binding state lock poisoned")
            .assign(name.clone(), value)
            .unwrap_or_else(|err| panic!("{err}"));
    })
}

/// Connect a handler to an event for the lifetime of the current owner.
///
/// The subscription is released by an owner cleanup; without an active
/// owner it stays live forever.
///
/// # Panics
///
/// Panics when `raw` resolves to an attribute name or when the target
/// rejects the subscription.
pub fn bind_event<T: PropertyTarget>(runtime: &Runtime, target: T, raw: &str, handler: T::Handler) {
    let name = match PropertyName::parse(raw) {
        PropertyName::Event(name) => name,
        PropertyName::Attribute(name) => {
            panic!("{}", PropertyError::ValueRequired(name))
        }
    };

    let subscription = target
        .subscribe(&name, handler)
        .unwrap_or_else(|err| panic!("{err}"));
    let result = runtime.try_on_cleanup(move || {
        target.unsubscribe(subscription);
    });
    if result.is_err() {
        tracing::warn!(event = %name, "event bound outside a reactive root; it will never disconnect");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};

    #[test]
    fn parse_classifies_names() {
        assert_eq!(
            PropertyName::parse("label"),
            PropertyName::Attribute("label".into())
        );
        assert_eq!(
            PropertyName::parse("marginTop"),
            PropertyName::Attribute("margin-top".into())
        );
        assert_eq!(
            PropertyName::parse("onClicked"),
            PropertyName::Event("clicked".into())
        );
        assert_eq!(
            PropertyName::parse("onNotifyValue"),
            PropertyName::Event("notify-value".into())
        );
        assert_eq!(
            PropertyName::parse("on:Weird.Name"),
            PropertyName::Event("Weird.Name".into())
        );
        assert_eq!(
            PropertyName::parse("prop:onlyLooksLikeCamel"),
            PropertyName::Attribute("onlyLooksLikeCamel".into())
        );
    }

    #[test]
    fn bare_on_is_an_attribute() {
        // "on" alone has no event name after the prefix.
        assert_eq!(
            PropertyName::parse("on"),
            PropertyName::Attribute("on".into())
        );
    }

    #[test]
    fn camel_to_kebab_conversion() {
        assert_eq!(camel_to_kebab("label"), "label");
        assert_eq!(camel_to_kebab("marginTop"), "margin-top");
        assert_eq!(camel_to_kebab("aBC"), "a-b-c");
        assert_eq!(camel_to_kebab("Clicked"), "clicked");
    }

    /// Records every write and subscription it receives.
    #[derive(Clone, Default)]
    struct RecorderTarget {
        writes: Arc<Mutex<Vec<(String, String)>>>,
        live: Arc<AtomicUsize>,
        next_token: Arc<AtomicUsize>,
    }

    impl PropertyTarget for RecorderTarget {
        type Value = String;
        type Handler = String;
        type Subscription = usize;

        fn set_attribute(&self, name: &str, value: &String) -> Result<(), PropertyError> {
            if name == "forbidden" {
                return Err(PropertyError::UnsupportedProperty(name.to_string()));
            }
            if name == "width" && value.parse::<u32>().is_err() {
                return Err(PropertyError::Rejected {
                    property: name.to_string(),
                    message: "expected an unsigned integer".to_string(),
                });
            }
            self.writes
                .lock()
                .unwrap()
                .push((name.to_string(), value.clone()));
            Ok(())
        }

        fn subscribe(&self, name: &str, _handler: String) -> Result<usize, PropertyError> {
            if name == "nonexistent" {
                return Err(PropertyError::UnsupportedEvent(name.to_string()));
            }
            self.live.fetch_add(1, Ordering::SeqCst);
            Ok(self.next_token.fetch_add(1, Ordering::SeqCst))
        }

        fn unsubscribe(&self, _subscription: usize) {
            self.live.fetch_sub(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn assign_skips_unchanged_values() {
        let target = RecorderTarget::default();
        let mut bindings = Bindings::new(target.clone());

        bindings.assign("label".into(), "hi".into()).unwrap();
        bindings.assign("label".into(), "hi".into()).unwrap();
        bindings.assign("label".into(), "bye".into()).unwrap();

        let writes = target.writes.lock().unwrap().clone();
        assert_eq!(
            writes,
            [
                ("label".to_string(), "hi".to_string()),
                ("label".to_string(), "bye".to_string())
            ]
        );
    }

    #[test]
    fn install_releases_the_previous_subscription() {
        let target = RecorderTarget::default();
        let mut bindings = Bindings::new(target.clone());

        bindings.install("clicked".into(), "first".into()).unwrap();
        assert_eq!(target.live.load(Ordering::SeqCst), 1);

        bindings.install("clicked".into(), "second".into()).unwrap();
        assert_eq!(target.live.load(Ordering::SeqCst), 1);

        bindings.clear();
        assert_eq!(target.live.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn apply_rejects_mismatched_pairings() {
        let target = RecorderTarget::default();
        let mut bindings = Bindings::new(target);

        assert_eq!(
            bindings.apply("onClicked", PropertyValue::Attribute("x".into())),
            Err(PropertyError::HandlerRequired("clicked".into()))
        );
        assert_eq!(
            bindings.apply("label", PropertyValue::Handler("h".into())),
            Err(PropertyError::ValueRequired("label".into()))
        );
    }

    #[test]
    fn apply_surfaces_target_rejections() {
        let target = RecorderTarget::default();
        let mut bindings = Bindings::new(target);

        assert_eq!(
            bindings.apply("forbidden", PropertyValue::Attribute("x".into())),
            Err(PropertyError::UnsupportedProperty("forbidden".into()))
        );
        assert_eq!(
            bindings.apply("on:nonexistent", PropertyValue::Handler("h".into())),
            Err(PropertyError::UnsupportedEvent("nonexistent".into()))
        );

        // A rejected assignment passes through untouched and is not
        // cached, so a corrected value still reaches the target.
        assert_eq!(
            bindings.apply("width", PropertyValue::Attribute("wide".into())),
            Err(PropertyError::Rejected {
                property: "width".into(),
                message: "expected an unsigned integer".into(),
            })
        );
        bindings
            .apply("width", PropertyValue::Attribute("120".into()))
            .unwrap();
    }

    #[test]
    fn bind_attribute_tracks_its_source() {
        let runtime = Runtime::new();
        let target = RecorderTarget::default();
        let label = runtime.create_signal("hi".to_string());

        let label_reader = label.clone();
        let write_target = target.clone();
        let ((), _root) = runtime.create_root(|| {
            bind_attribute(&runtime, write_target, "label", move || label_reader.get());
        });
        assert_eq!(
            target.writes.lock().unwrap().clone(),
            [("label".to_string(), "hi".to_string())]
        );

        label.set("bye".to_string());
        assert_eq!(target.writes.lock().unwrap().len(), 2);

        // An equal write is suppressed before it reaches the target.
        label.set("bye".to_string());
        assert_eq!(target.writes.lock().unwrap().len(), 2);
    }

    #[test]
    fn bind_event_disconnects_on_owner_disposal() {
        let runtime = Runtime::new();
        let target = RecorderTarget::default();

        let bound = target.clone();
        let ((), root) = runtime.create_root(|| {
            bind_event(&runtime, bound, "onClicked", "handler".into());
        });
        assert_eq!(target.live.load(Ordering::SeqCst), 1);

        root.dispose();
        assert_eq!(target.live.load(Ordering::SeqCst), 0);
    }
}
