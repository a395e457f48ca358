//! Object model for dispatchable dashboard entities.
//!
//! Every displayable or sortable entity is tagged with a static
//! [`ObjectClass`] descriptor holding its parent link and up to three
//! operation slots:
//!
//! - **display**: render the instance into a [`RichString`]
//! - **delete**: release the instance
//! - **compare**: order two instances of the same class
//!
//! Dispatch only ever consults the instance's own descriptor. A slot left
//! empty on a leaf class is unsupported for that class even if an ancestor
//! fills it; the parent link is walked by [`is_a`] and nothing else.
//!
//! # Module Hierarchy
//!
//! ```text
//! object/
//! ├── mod.rs        - ObjectClass, Object trait, dispatch
//! └── list_item.rs  - ListItem (a plain text row)
//! ```

pub mod list_item;

use std::any::Any;
use std::cmp::Ordering;
use std::fmt;

use crate::error::{Capability, MissingCapability};
use crate::rich_string::RichString;

pub use list_item::{ListItem, LIST_ITEM_CLASS};

pub type DisplayFn = fn(&dyn Object, &mut RichString);
pub type DeleteFn = fn(Box<dyn Object>);
pub type CompareFn = fn(&dyn Object, &dyn Object) -> Ordering;

/// Immutable description of one concrete type.
pub struct ObjectClass {
    pub name: &'static str,
    pub extends: Option<&'static ObjectClass>,
    pub display: Option<DisplayFn>,
    pub delete: Option<DeleteFn>,
    pub compare: Option<CompareFn>,
}

impl ObjectClass {
    pub const fn new(
        name: &'static str,
        extends: Option<&'static ObjectClass>,
        display: Option<DisplayFn>,
        delete: Option<DeleteFn>,
        compare: Option<CompareFn>,
    ) -> Self {
        Self {
            name,
            extends,
            display,
            delete,
            compare,
        }
    }

    pub fn is_root(&self) -> bool {
        self.extends.is_none()
    }
}

impl fmt::Debug for ObjectClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObjectClass")
            .field("name", &self.name)
            .field("extends", &self.extends.map(|parent| parent.name))
            .field("display", &self.display.is_some())
            .field("delete", &self.delete.is_some())
            .field("compare", &self.compare.is_some())
            .finish()
    }
}

/// Root of every class hierarchy. Supports no operations.
pub static OBJECT_CLASS: ObjectClass = ObjectClass::new("Object", None, None, None, None);

/// An instance tagged with a class descriptor.
///
/// Use [`impl_object!`](crate::impl_object) rather than implementing this by hand.
pub trait Object: Any {
    fn class(&self) -> &'static ObjectClass;
    fn as_any(&self) -> &dyn Any;
    fn into_any(self: Box<Self>) -> Box<dyn Any>;
}

impl dyn Object {
    pub fn downcast_ref<T: Object>(&self) -> Option<&T> {
        self.as_any().downcast_ref::<T>()
    }

    pub fn downcast<T: Object>(self: Box<Self>) -> Result<Box<T>, Box<dyn Any>> {
        self.into_any().downcast::<T>()
    }
}

impl fmt::Debug for dyn Object {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}>", self.class().name)
    }
}

/// Tag a type with its static class descriptor.
///
/// ```ignore
/// impl_object!(ListItem, LIST_ITEM_CLASS);
/// ```
#[macro_export]
macro_rules! impl_object {
    ($ty:ty, $class:path) => {
        impl $crate::object::Object for $ty {
            fn class(&self) -> &'static $crate::object::ObjectClass {
                &$class
            }

            fn as_any(&self) -> &dyn ::std::any::Any {
                self
            }

            fn into_any(self: Box<Self>) -> Box<dyn ::std::any::Any> {
                self
            }
        }
    };
}

fn missing(class: &'static ObjectClass, capability: Capability) -> MissingCapability {
    MissingCapability {
        class: class.name,
        capability,
    }
}

pub fn class_name(obj: &dyn Object) -> &'static str {
    obj.class().name
}

pub fn try_display(obj: &dyn Object, out: &mut RichString) -> Result<(), MissingCapability> {
    let class = obj.class();
    let display = class.display.ok_or_else(|| missing(class, Capability::Display))?;
    display(obj, out);
    Ok(())
}

/// Release `obj` through its class.
///
/// When the slot is missing the box is still dropped normally.
pub fn try_delete(obj: Box<dyn Object>) -> Result<(), MissingCapability> {
    let class = obj.class();
    let delete = class.delete.ok_or_else(|| missing(class, Capability::Delete))?;
    delete(obj);
    Ok(())
}

pub fn try_compare(obj: &dyn Object, other: &dyn Object) -> Result<Ordering, MissingCapability> {
    let class = obj.class();
    let compare = class.compare.ok_or_else(|| missing(class, Capability::Compare))?;
    Ok(compare(obj, other))
}

/// Render `obj` into `out`. Panics if its class has no display slot.
pub fn display(obj: &dyn Object, out: &mut RichString) {
    if let Err(err) = try_display(obj, out) {
        panic!("{}", err);
    }
}

/// Release `obj`. Panics if its class has no delete slot.
pub fn delete(obj: Box<dyn Object>) {
    if let Err(err) = try_delete(obj) {
        panic!("{}", err);
    }
}

/// Order `obj` against `other`. Panics if its class has no compare slot.
pub fn compare(obj: &dyn Object, other: &dyn Object) -> Ordering {
    match try_compare(obj, other) {
        Ok(ordering) => ordering,
        Err(err) => panic!("{}", err),
    }
}

/// True if `class` is the instance's own class or one of its ancestors.
///
/// Diagnostic builds only.
#[cfg(any(debug_assertions, test))]
pub fn is_a(obj: &dyn Object, class: &ObjectClass) -> bool {
    let mut current = Some(obj.class());
    while let Some(klass) = current {
        if std::ptr::eq(klass, class) {
            return true;
        }
        current = klass.extends;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crt::color::Attr;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};

    static METER_DELETED: AtomicUsize = AtomicUsize::new(0);

    static METER_CLASS: ObjectClass = ObjectClass::new(
        "Meter",
        Some(&OBJECT_CLASS),
        Some(meter_display),
        Some(meter_delete),
        Some(meter_compare),
    );

    // Display only; the parent's delete/compare must not be reachable.
    static LED_METER_CLASS: ObjectClass =
        ObjectClass::new("LedMeter", Some(&METER_CLASS), Some(led_display), None, None);

    static SCREEN_CLASS: ObjectClass = ObjectClass::new("Screen", None, None, None, None);

    struct Meter {
        value: u32,
    }

    struct LedMeter {
        value: u32,
    }

    struct Screen;

    crate::impl_object!(Meter, METER_CLASS);
    crate::impl_object!(LedMeter, LED_METER_CLASS);
    crate::impl_object!(Screen, SCREEN_CLASS);

    fn meter_display(obj: &dyn Object, out: &mut RichString) {
        if let Some(meter) = obj.downcast_ref::<Meter>() {
            out.append(Attr::NORMAL, &format!("{}%", meter.value));
        }
    }

    fn meter_delete(obj: Box<dyn Object>) {
        if obj.downcast::<Meter>().is_ok() {
            METER_DELETED.fetch_add(1, AtomicOrdering::SeqCst);
        }
    }

    fn meter_compare(a: &dyn Object, b: &dyn Object) -> Ordering {
        match (a.downcast_ref::<Meter>(), b.downcast_ref::<Meter>()) {
            (Some(a), Some(b)) => a.value.cmp(&b.value),
            _ => Ordering::Equal,
        }
    }

    fn led_display(obj: &dyn Object, out: &mut RichString) {
        if let Some(led) = obj.downcast_ref::<LedMeter>() {
            out.append(Attr::BOLD, &format!("[{:03}]", led.value));
        }
    }

    #[test]
    fn test_dispatch_uses_own_class() {
        let meter = Meter { value: 42 };
        let mut out = RichString::new();
        display(&meter, &mut out);
        assert_eq!(out.text(), "42%");

        let led = LedMeter { value: 7 };
        out.clear();
        display(&led, &mut out);
        assert_eq!(out.text(), "[007]");
    }

    #[test]
    fn test_no_fallback_to_parent() {
        let led = LedMeter { value: 1 };
        let other = LedMeter { value: 2 };

        let err = try_compare(&led, &other).unwrap_err();
        assert_eq!(err.class, "LedMeter");
        assert_eq!(err.capability, Capability::Compare);

        let err = try_delete(Box::new(led)).unwrap_err();
        assert_eq!(err.capability, Capability::Delete);
    }

    #[test]
    #[should_panic(expected = "does not implement `compare`")]
    fn test_compare_panics_without_slot() {
        let a = LedMeter { value: 1 };
        let b = LedMeter { value: 2 };
        compare(&a, &b);
    }

    #[test]
    #[should_panic(expected = "class `Screen` does not implement `display`")]
    fn test_display_panics_without_slot() {
        let mut out = RichString::new();
        display(&Screen, &mut out);
    }

    #[test]
    fn test_compare_and_delete() {
        let low = Meter { value: 10 };
        let high = Meter { value: 90 };
        assert_eq!(compare(&low, &high), Ordering::Less);
        assert_eq!(compare(&high, &low), Ordering::Greater);
        assert_eq!(compare(&low, &low), Ordering::Equal);

        let before = METER_DELETED.load(AtomicOrdering::SeqCst);
        delete(Box::new(high));
        assert_eq!(METER_DELETED.load(AtomicOrdering::SeqCst), before + 1);
    }

    #[test]
    fn test_is_a_walks_parent_chain() {
        let led = LedMeter { value: 0 };
        assert!(is_a(&led, &LED_METER_CLASS));
        assert!(is_a(&led, &METER_CLASS));
        assert!(is_a(&led, &OBJECT_CLASS));
        assert!(!is_a(&led, &SCREEN_CLASS));

        let meter = Meter { value: 0 };
        assert!(!is_a(&meter, &LED_METER_CLASS));

        // Root-only class is unrelated to the Object hierarchy
        assert!(is_a(&Screen, &SCREEN_CLASS));
        assert!(!is_a(&Screen, &OBJECT_CLASS));
    }

    #[test]
    fn test_class_debug() {
        let text = format!("{:?}", LED_METER_CLASS);
        assert!(text.contains("LedMeter"));
        assert!(text.contains("Some(\"Meter\")"));
        assert!(OBJECT_CLASS.is_root());
        assert_eq!(class_name(&Meter { value: 1 }), "Meter");
    }
}
