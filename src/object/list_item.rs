//! Plain text row with an integer key

use std::cmp::Ordering;

use super::{Object, ObjectClass, OBJECT_CLASS};
use crate::crt::{self, color::ColorElement};
use crate::rich_string::RichString;

pub static LIST_ITEM_CLASS: ObjectClass = ObjectClass::new(
    "ListItem",
    Some(&OBJECT_CLASS),
    Some(list_item_display),
    Some(list_item_delete),
    Some(list_item_compare),
);

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ListItem {
    pub value: String,
    pub key: i32,
}

crate::impl_object!(ListItem, LIST_ITEM_CLASS);

impl ListItem {
    pub fn new(value: impl Into<String>, key: i32) -> Self {
        Self {
            value: value.into(),
            key,
        }
    }

    /// Append text to the value, separated by a space
    pub fn append(&mut self, text: &str) {
        if !self.value.is_empty() {
            self.value.push(' ');
        }
        self.value.push_str(text);
    }
}

fn list_item_display(obj: &dyn Object, out: &mut RichString) {
    let Some(item) = obj.downcast_ref::<ListItem>() else {
        return;
    };
    let attr = crt::colors().attr(ColorElement::DefaultColor);
    out.append(attr, &item.value);
}

fn list_item_delete(obj: Box<dyn Object>) {
    drop(obj.downcast::<ListItem>());
}

fn list_item_compare(a: &dyn Object, b: &dyn Object) -> Ordering {
    match (a.downcast_ref::<ListItem>(), b.downcast_ref::<ListItem>()) {
        (Some(a), Some(b)) => a.value.cmp(&b.value),
        _ => Ordering::Equal,
    }
}
