//! Parsed world-description elements.

use std::fmt;

/// One element of a world description: tag name, attributes in document
/// order, trimmed text content, and child elements.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Element {
    pub name: String,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
}

impl Element {
    /// Look up an attribute value by key.
    #[must_use]
    pub fn attr(&self, key: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// First child with the given tag name.
    #[must_use]
    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|c| c.name == name)
    }

    /// All children with the given tag name, in document order.
    pub fn children_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Element> {
        self.children.iter().filter(move |c| c.name == name)
    }

    /// Parse the text content as whitespace-separated floats, the way
    /// SDF-style documents encode vectors (`"0 0 1.5"`).
    #[must_use]
    pub fn text_floats(&self) -> Option<Vec<f64>> {
        let mut out = Vec::new();
        for word in self.text.split_whitespace() {
            out.push(word.parse().ok()?);
        }
        Some(out)
    }
}

impl fmt::Display for Element {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{}", self.name)?;
        for (k, v) in &self.attributes {
            write!(f, " {k}=\"{v}\"")?;
        }
        write!(f, ">")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Element {
        Element {
            name: "model".into(),
            attributes: vec![("name".into(), "rover".into())],
            text: String::new(),
            children: vec![
                Element {
                    name: "pose".into(),
                    text: "1 2 3".into(),
                    ..Element::default()
                },
                Element {
                    name: "link".into(),
                    ..Element::default()
                },
                Element {
                    name: "link".into(),
                    ..Element::default()
                },
            ],
        }
    }

    #[test]
    fn test_attr_lookup() {
        let e = sample();
        assert_eq!(e.attr("name"), Some("rover"));
        assert_eq!(e.attr("missing"), None);
    }

    #[test]
    fn test_child_navigation() {
        let e = sample();
        assert_eq!(e.child("pose").unwrap().text, "1 2 3");
        assert_eq!(e.children_named("link").count(), 2);
    }

    #[test]
    fn test_text_floats() {
        let e = sample();
        assert_eq!(e.child("pose").unwrap().text_floats(), Some(vec![1.0, 2.0, 3.0]));
        let bad = Element {
            text: "1 two 3".into(),
            ..Element::default()
        };
        assert_eq!(bad.text_floats(), None);
    }
}
