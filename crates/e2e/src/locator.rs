//! Typed Playwright locators

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::script::js_string;

/// Where a locator starts on the page
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Anchor {
    Css(String),
    Placeholder(String),
    TestId(String),
    Role {
        role: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Narrowing applied after the anchor, in order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Refinement {
    /// Descendant matching a CSS selector
    Css(String),
    HasText(String),
    Nth(usize),
    First,
    Last,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Locator {
    #[serde(flatten)]
    pub anchor: Anchor,

    /// Written as `- has_text: ...` / `- nth: 1` / `- first`
    #[serde(
        default,
        skip_serializing_if = "Vec::is_empty",
        with = "serde_yaml::with::singleton_map_recursive"
    )]
    pub refine: Vec<Refinement>,
}

impl Locator {
    fn anchored(anchor: Anchor) -> Self {
        Self {
            anchor,
            refine: Vec::new(),
        }
    }

    pub fn css(selector: impl Into<String>) -> Self {
        Self::anchored(Anchor::Css(selector.into()))
    }

    pub fn placeholder(text: impl Into<String>) -> Self {
        Self::anchored(Anchor::Placeholder(text.into()))
    }

    pub fn test_id(id: impl Into<String>) -> Self {
        Self::anchored(Anchor::TestId(id.into()))
    }

    pub fn role(role: impl Into<String>, name: impl Into<String>) -> Self {
        Self::anchored(Anchor::Role {
            role: role.into(),
            name: Some(name.into()),
        })
    }

    fn refined(mut self, refinement: Refinement) -> Self {
        self.refine.push(refinement);
        self
    }

    pub fn locator(self, selector: impl Into<String>) -> Self {
        self.refined(Refinement::Css(selector.into()))
    }

    pub fn has_text(self, text: impl Into<String>) -> Self {
        self.refined(Refinement::HasText(text.into()))
    }

    pub fn nth(self, index: usize) -> Self {
        self.refined(Refinement::Nth(index))
    }

    pub fn first(self) -> Self {
        self.refined(Refinement::First)
    }

    pub fn last(self) -> Self {
        self.refined(Refinement::Last)
    }

    /// Render as a Playwright expression rooted at `root` (usually `page`)
    pub fn to_js(&self, root: &str) -> String {
        let mut js = match &self.anchor {
            Anchor::Css(sel) => format!("{}.locator({})", root, js_string(sel)),
            Anchor::Placeholder(text) => format!("{}.getByPlaceholder({})", root, js_string(text)),
            Anchor::TestId(id) => format!("{}.getByTestId({})", root, js_string(id)),
            Anchor::Role { role, name: Some(name) } => format!(
                "{}.getByRole({}, {{ name: {} }})",
                root,
                js_string(role),
                js_string(name)
            ),
            Anchor::Role { role, name: None } => format!("{}.getByRole({})", root, js_string(role)),
        };

        for refinement in &self.refine {
            match refinement {
                Refinement::Css(sel) => js.push_str(&format!(".locator({})", js_string(sel))),
                Refinement::HasText(text) => {
                    js.push_str(&format!(".filter({{ hasText: {} }})", js_string(text)))
                }
                Refinement::Nth(i) => js.push_str(&format!(".nth({})", i)),
                Refinement::First => js.push_str(".first()"),
                Refinement::Last => js.push_str(".last()"),
            }
        }

        js
    }
}

impl fmt::Display for Locator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.anchor {
            Anchor::Css(sel) => write!(f, "{}", sel)?,
            Anchor::Placeholder(text) => write!(f, "placeholder={}", text)?,
            Anchor::TestId(id) => write!(f, "testid={}", id)?,
            Anchor::Role { role, name: Some(name) } => write!(f, "role={}[{}]", role, name)?,
            Anchor::Role { role, name: None } => write!(f, "role={}", role)?,
        }
        for refinement in &self.refine {
            match refinement {
                Refinement::Css(sel) => write!(f, " >> {}", sel)?,
                Refinement::HasText(text) => write!(f, " >> has_text={}", text)?,
                Refinement::Nth(i) => write!(f, " >> nth={}", i)?,
                Refinement::First => write!(f, " >> first")?,
                Refinement::Last => write!(f, " >> last")?,
            }
        }
        Ok(())
    }
}
