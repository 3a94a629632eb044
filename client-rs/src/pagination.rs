//! Pagination click glue
//!
//! A click on a button inside the pagination container copies the button's
//! `page` data attribute into the hidden page input and submits the page form.

use std::collections::HashMap;

pub const PAGINATION_CONTAINER_ID: &str = "pagination";
pub const PAGE_FORM_ID: &str = "pageForm";
pub const PAGE_INPUT_ID: &str = "pageInput";
pub const PAGE_ATTRIBUTE: &str = "page";

/// The slice of a page's document the glue touches
pub trait PageDocument {
    fn has_element(&self, id: &str) -> bool;

    fn set_input_value(&mut self, input_id: &str, value: &str);

    fn submit_form(&mut self, form_id: &str);
}

/// A click that bubbled up to the pagination container
#[derive(Debug, Clone, Default)]
pub struct ClickEvent {
    /// Tag of the clicked element (e.g. "BUTTON")
    pub tag_name: String,
    /// The element's data attributes, without the `data-` prefix
    pub dataset: HashMap<String, String>,
}

impl ClickEvent {
    pub fn new(tag_name: impl Into<String>) -> Self {
        Self {
            tag_name: tag_name.into(),
            dataset: HashMap::new(),
        }
    }

    pub fn data(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.dataset.insert(key.into(), value.into());
        self
    }

    /// Shorthand for a pagination button click
    pub fn button(page: impl Into<String>) -> Self {
        Self::new("BUTTON").data(PAGE_ATTRIBUTE, page)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClickOutcome {
    /// Not a button click
    Ignored,
    /// The form was submitted with this page value
    Submitted { page: String },
}

/// Click handler bound to a document's pagination container
#[derive(Debug, Clone)]
pub struct PaginationControl {
    form_id: String,
    input_id: String,
}

impl PaginationControl {
    /// Bind to the document; `None` when it has no pagination container
    pub fn attach<D: PageDocument + ?Sized>(doc: &D) -> Option<Self> {
        if !doc.has_element(PAGINATION_CONTAINER_ID) {
            return None;
        }

        Some(Self {
            form_id: PAGE_FORM_ID.to_string(),
            input_id: PAGE_INPUT_ID.to_string(),
        })
    }

    pub fn handle_click<D: PageDocument + ?Sized>(&self, doc: &mut D, event: &ClickEvent) -> ClickOutcome {
        if !event.tag_name.eq_ignore_ascii_case("button") {
            return ClickOutcome::Ignored;
        }

        // No validation: whatever the button carries is what the server gets
        let page = event.dataset.get(PAGE_ATTRIBUTE).cloned().unwrap_or_default();
        doc.set_input_value(&self.input_id, &page);
        doc.submit_form(&self.form_id);

        ClickOutcome::Submitted { page }
    }
}
