//! Element locators
//!
//! Faucet definitions name their claim trigger and challenge element with a
//! simple CSS-like selector: `#id`, `.class` or a bare tag name. Pages are
//! scanned as a stream of markup events without building a DOM, so unclosed
//! HTML tags (`<input>`, `<img>`) and unquoted or valueless attributes are
//! tolerated.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::debug;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Locator {
    Id(String),
    Class(String),
    Tag(String),
}

impl Locator {
    /// Parse a selector. Attribute filters (`input[type="text"]`) are reduced
    /// to their tag name.
    pub fn parse(selector: &str) -> Option<Self> {
        let selector = selector.trim();
        if let Some(id) = selector.strip_prefix('#') {
            return (!id.is_empty()).then(|| Locator::Id(id.to_string()));
        }
        if let Some(class) = selector.strip_prefix('.') {
            return (!class.is_empty()).then(|| Locator::Class(class.to_string()));
        }
        let tag = selector.split('[').next().unwrap_or_default().trim();
        if tag.is_empty() || !tag.chars().all(|c| c.is_ascii_alphanumeric() || c == '-') {
            return None;
        }
        Some(Locator::Tag(tag.to_ascii_lowercase()))
    }

    pub fn matches(&self, element: &Element) -> bool {
        match self {
            Locator::Id(id) => element.attr("id").is_some_and(|v| v == id),
            Locator::Class(class) => element
                .attr("class")
                .is_some_and(|v| v.split_whitespace().any(|c| c == class)),
            Locator::Tag(name) => element.name == *name,
        }
    }

    /// First element in `html` matched by this locator
    pub fn find(&self, html: &str) -> Option<Element> {
        Tags::new(html).find_map(|tag| match tag {
            Tag::Open(element) if self.matches(&element) => Some(element),
            _ => None,
        })
    }
}

/// Convenience wrapper: parse `selector` and look it up in `html`
pub fn find_element(html: &str, selector: &str) -> Option<Element> {
    Locator::parse(selector)?.find(html)
}

/// An opening (or self-closing) tag with its attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    /// Lowercased tag name
    pub name: String,
    /// Lowercased attribute names with their raw values, in source order
    pub attributes: Vec<(String, String)>,
    /// Tag source between the angle brackets
    pub raw: String,
}

impl Element {
    fn from_start(start: &BytesStart<'_>) -> Self {
        let attributes = start
            .html_attributes()
            .filter_map(Result::ok)
            .map(|attr| {
                (
                    String::from_utf8_lossy(attr.key.as_ref()).to_ascii_lowercase(),
                    String::from_utf8_lossy(&attr.value).into_owned(),
                )
            })
            .collect();

        Self {
            name: String::from_utf8_lossy(start.name().as_ref()).to_ascii_lowercase(),
            attributes,
            raw: String::from_utf8_lossy(start).into_owned(),
        }
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    fn has_attr(&self, name: &str) -> bool {
        self.attr(name).is_some()
    }
}

enum Tag {
    Open(Element),
    Close(String),
}

/// Markup event stream reduced to opening and closing tags
struct Tags<'a> {
    reader: Reader<&'a [u8]>,
    done: bool,
}

impl<'a> Tags<'a> {
    fn new(html: &'a str) -> Self {
        let mut reader = Reader::from_str(html);
        // HTML leaves void elements open and tolerates stray end tags
        reader.config_mut().check_end_names = false;
        Self {
            reader,
            done: false,
        }
    }
}

impl Iterator for Tags<'_> {
    type Item = Tag;

    fn next(&mut self) -> Option<Tag> {
        while !self.done {
            match self.reader.read_event() {
                Ok(Event::Start(start)) | Ok(Event::Empty(start)) => {
                    return Some(Tag::Open(Element::from_start(&start)));
                }
                Ok(Event::End(end)) => {
                    let name = String::from_utf8_lossy(end.name().as_ref()).to_ascii_lowercase();
                    return Some(Tag::Close(name));
                }
                Ok(Event::Eof) => self.done = true,
                Ok(_) => {}
                Err(e) => {
                    debug!(error = %e, "Stopped scanning malformed markup");
                    self.done = true;
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormMethod {
    Get,
    Post,
}

/// The request a claim trigger performs when activated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimForm {
    /// Target relative to the page; `None` submits back to the page itself
    pub action: Option<String>,
    pub method: FormMethod,
    pub fields: Vec<(String, String)>,
    /// First free-text input of the form, where a challenge answer goes
    pub answer_field: Option<String>,
}

impl ClaimForm {
    fn open(form: &Element) -> Self {
        let method = match form.attr("method") {
            Some(m) if m.eq_ignore_ascii_case("post") => FormMethod::Post,
            _ => FormMethod::Get,
        };
        Self {
            action: form
                .attr("action")
                .filter(|a| !a.trim().is_empty())
                .map(str::to_string),
            method,
            fields: Vec::new(),
            answer_field: None,
        }
    }

    fn link(href: &str) -> Option<Self> {
        let href = href.trim();
        if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
            return None;
        }
        Some(Self {
            action: Some(href.to_string()),
            method: FormMethod::Get,
            fields: Vec::new(),
            answer_field: None,
        })
    }

    /// Record the value a control inside the form would submit
    fn absorb(&mut self, control: &Element, is_trigger: bool) {
        let Some(name) = control.attr("name").filter(|n| !n.is_empty()) else {
            return;
        };
        let value = control.attr("value").unwrap_or_default();

        match control.name.as_str() {
            "input" => {
                let kind = control.attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "image" | "button" if is_trigger => self.set_field(name, value),
                    "submit" | "image" | "button" | "reset" | "file" => {}
                    "checkbox" | "radio" if !control.has_attr("checked") => {}
                    "text" => {
                        if self.answer_field.is_none() {
                            self.answer_field = Some(name.to_string());
                        }
                        self.set_field(name, value);
                    }
                    _ => self.set_field(name, value),
                }
            }
            "button" if is_trigger => self.set_field(name, value),
            _ => {}
        }
    }

    /// Replace the value of `name`, or append it
    pub fn set_field(&mut self, name: &str, value: &str) {
        match self.fields.iter_mut().find(|(key, _)| key == name) {
            Some(field) => field.1 = value.to_string(),
            None => self.fields.push((name.to_string(), value.to_string())),
        }
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// What activating the element matched by `trigger` would submit: its
/// enclosing form, or the link it points at. `None` when the trigger is
/// missing or submits nothing.
pub fn claim_submission(html: &str, trigger: &Locator) -> Option<ClaimForm> {
    // The open form and whether it holds the trigger
    let mut current: Option<(ClaimForm, bool)> = None;

    for tag in Tags::new(html) {
        match tag {
            Tag::Open(element) if element.name == "form" => {
                current = Some((ClaimForm::open(&element), false));
            }
            Tag::Open(element) => {
                let is_trigger = trigger.matches(&element);
                match current.as_mut() {
                    Some((form, holds)) => {
                        form.absorb(&element, is_trigger);
                        *holds |= is_trigger;
                    }
                    None if is_trigger => return element.attr("href").and_then(ClaimForm::link),
                    None => {}
                }
            }
            Tag::Close(name) if name == "form" => {
                if let Some((form, true)) = current.take() {
                    return Some(form);
                }
            }
            Tag::Close(_) => {}
        }
    }

    // A form left open at the end of the page
    current.and_then(|(form, holds)| holds.then_some(form))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<!DOCTYPE html>
<html><body>
  <div class="captcha-container wide"><img src="/captcha.png"></div>
  <button id='claim-button' class=btn disabled>Claim</button>
  <input type="text" name="answer"/>
</body></html>"#;

    const FORM_PAGE: &str = r#"<html><body>
  <p>Earn free Bitcoin</p>
  <form id="search" action="/search"><input name="q"></form>
  <form action="/claim" method="POST">
    <input type="hidden" name="csrf" value="t0k3n">
    <div class="captcha"><img src="/c.png"></div>
    <input type="text" name="captcha_answer">
    <input type="checkbox" name="remember">
    <input type="checkbox" name="terms" value="yes" checked>
    <input type="submit" name="cancel" value="Cancel">
    <button id="claim-button" name="action" value="claim">Claim</button>
  </form>
</body></html>"#;

    #[test]
    fn test_parse_selectors() {
        assert_eq!(Locator::parse("#claim"), Some(Locator::Id("claim".to_string())));
        assert_eq!(
            Locator::parse(".claim-btn"),
            Some(Locator::Class("claim-btn".to_string()))
        );
        assert_eq!(
            Locator::parse("input[type=\"text\"]"),
            Some(Locator::Tag("input".to_string()))
        );
        assert_eq!(Locator::parse("#"), None);
        assert_eq!(Locator::parse("div > span"), None);
    }

    #[test]
    fn test_find_by_id() {
        let found = find_element(PAGE, "#claim-button").unwrap();
        assert_eq!(found.name, "button");
        assert!(found.raw.starts_with("button"));
        assert!(find_element(PAGE, "#free_play_form_button").is_none());
    }

    #[test]
    fn test_find_by_class_token() {
        assert!(find_element(PAGE, ".captcha-container").is_some());
        assert!(find_element(PAGE, ".wide").is_some());
        assert!(find_element(PAGE, ".captcha").is_none());
    }

    #[test]
    fn test_unquoted_and_valueless_attributes() {
        let button = find_element(PAGE, ".btn").unwrap();
        assert_eq!(button.attr("id"), Some("claim-button"));
        assert_eq!(button.attr("disabled"), Some(""));
    }

    #[test]
    fn test_find_by_tag() {
        let input = find_element(PAGE, "input[type=\"text\"]").unwrap();
        assert_eq!(input.attr("name"), Some("answer"));
    }

    #[test]
    fn test_submission_from_enclosing_form() {
        let trigger = Locator::parse("#claim-button").unwrap();
        let form = claim_submission(FORM_PAGE, &trigger).unwrap();

        assert_eq!(form.action.as_deref(), Some("/claim"));
        assert_eq!(form.method, FormMethod::Post);
        assert_eq!(form.answer_field.as_deref(), Some("captcha_answer"));
        assert_eq!(form.field("csrf"), Some("t0k3n"));
        assert_eq!(form.field("terms"), Some("yes"));
        assert_eq!(form.field("action"), Some("claim"));
        // Unchecked boxes and other submit buttons stay out
        assert_eq!(form.field("remember"), None);
        assert_eq!(form.field("cancel"), None);
        // Fields of unrelated forms stay out
        assert_eq!(form.field("q"), None);
    }

    #[test]
    fn test_submission_from_link() {
        let html = r#"<a class="claim" href="/faucet/claim?x=1">Claim</a>"#;
        let form = claim_submission(html, &Locator::parse(".claim").unwrap()).unwrap();
        assert_eq!(form.action.as_deref(), Some("/faucet/claim?x=1"));
        assert_eq!(form.method, FormMethod::Get);

        let scripted = r#"<a class="claim" href="javascript:claim()">Claim</a>"#;
        assert!(claim_submission(scripted, &Locator::parse(".claim").unwrap()).is_none());
    }

    #[test]
    fn test_formless_button_submits_nothing() {
        assert!(claim_submission(PAGE, &Locator::parse("#claim-button").unwrap()).is_none());
        assert!(claim_submission(PAGE, &Locator::parse("#missing").unwrap()).is_none());
    }

    #[test]
    fn test_set_field_replaces_value() {
        let mut form = claim_submission(FORM_PAGE, &Locator::parse("#claim-button").unwrap())
            .unwrap();
        form.set_field("captcha_answer", "ABCD");
        form.set_field("extra", "1");
        assert_eq!(form.field("captcha_answer"), Some("ABCD"));
        assert_eq!(form.field("extra"), Some("1"));
        assert_eq!(
            form.fields.iter().filter(|(k, _)| k == "captcha_answer").count(),
            1
        );
    }
}
