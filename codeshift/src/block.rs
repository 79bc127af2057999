//! The classified block tree handed over by a language front end.
//!
//! A front end splits a source file into a sequence of [`CodeBlock`]s. Blocks
//! that introduce scope or branch ([`Definition`], [`Decision`]) own their
//! children; everything else is a leaf that carries its literal text.
//!
//! The text of a container is always the concatenation of its children's
//! text, so rendering any list of blocks reproduces the source exactly.

use facet::Facet;
use std::collections::BTreeSet;

/// One classified unit of source structure.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
#[repr(u8)]
pub enum CodeBlock {
    /// Introduces a name into scope (function, class, variable, ...).
    Definition(Definition),
    /// A statement that reads and writes identifiers.
    Action(Action),
    /// A branching construct, all branches flattened into one child list.
    Decision(Decision),
    /// Whitespace, punctuation, comments.
    Text(TextBlock),
}

/// A block that introduces a name into scope.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Definition {
    /// Definition kind tag, e.g. `"function"`, `"class"`, `"variable"`.
    pub kind: String,
    /// The introduced name, if the construct has one.
    pub name: Option<String>,
    /// Parameter identifiers, in declaration order.
    pub parameters: Vec<String>,
    /// Body blocks, in source order.
    #[facet(recursive_type)]
    pub children: Vec<CodeBlock>,
}

/// A leaf statement.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Action {
    /// Identifiers written by the statement ("depending variables").
    pub writes: BTreeSet<String>,
    /// Identifiers read by the statement ("depended-on").
    pub reads: BTreeSet<String>,
    /// Literal text span.
    pub text: String,
}

/// A branching construct.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct Decision {
    /// Decision kind tag, e.g. `"if"`, `"match"`, `"while"`.
    pub kind: String,
    /// Identifiers the condition depends on.
    pub depends_on: BTreeSet<String>,
    /// All branches, flattened in source order.
    #[facet(recursive_type)]
    pub children: Vec<CodeBlock>,
}

/// Non-semantic text.
#[derive(Debug, Clone, PartialEq, Eq, Facet)]
pub struct TextBlock {
    /// Literal text span.
    pub text: String,
    /// Structural marker, e.g. `"else"` for an else head that should merge
    /// with the preceding `if`.
    pub special: Option<String>,
}

fn names(items: &[&str]) -> BTreeSet<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

impl CodeBlock {
    /// Build a [`Definition`] block.
    pub fn definition(
        kind: &str,
        name: Option<&str>,
        parameters: &[&str],
        children: Vec<CodeBlock>,
    ) -> Self {
        CodeBlock::Definition(Definition {
            kind: kind.to_owned(),
            name: name.map(str::to_owned),
            parameters: parameters.iter().map(|p| (*p).to_owned()).collect(),
            children,
        })
    }

    /// Build an [`Action`] leaf.
    pub fn action(text: &str, writes: &[&str], reads: &[&str]) -> Self {
        CodeBlock::Action(Action {
            writes: names(writes),
            reads: names(reads),
            text: text.to_owned(),
        })
    }

    /// Build a [`Decision`] block.
    pub fn decision(kind: &str, depends_on: &[&str], children: Vec<CodeBlock>) -> Self {
        CodeBlock::Decision(Decision {
            kind: kind.to_owned(),
            depends_on: names(depends_on),
            children,
        })
    }

    /// Build a plain [`TextBlock`] leaf.
    pub fn text(text: &str) -> Self {
        CodeBlock::Text(TextBlock {
            text: text.to_owned(),
            special: None,
        })
    }

    /// Build a [`TextBlock`] leaf carrying a structural marker.
    pub fn special_text(text: &str, special: &str) -> Self {
        CodeBlock::Text(TextBlock {
            text: text.to_owned(),
            special: Some(special.to_owned()),
        })
    }

    /// Child blocks; empty for leaves.
    pub fn children(&self) -> &[CodeBlock] {
        match self {
            CodeBlock::Definition(def) => &def.children,
            CodeBlock::Decision(dec) => &dec.children,
            CodeBlock::Action(_) | CodeBlock::Text(_) => &[],
        }
    }

    /// Whether this block has no children.
    pub fn is_leaf(&self) -> bool {
        self.children().is_empty()
    }

    /// Short variant name, used in logs.
    pub fn kind_name(&self) -> &'static str {
        match self {
            CodeBlock::Definition(_) => "definition",
            CodeBlock::Action(_) => "action",
            CodeBlock::Decision(_) => "decision",
            CodeBlock::Text(_) => "text",
        }
    }

    /// Every identifier mentioned by this block or its descendants.
    pub fn identifiers(&self) -> BTreeSet<&str> {
        let mut out = BTreeSet::new();
        self.collect_identifiers(&mut out);
        out
    }

    fn collect_identifiers<'a>(&'a self, out: &mut BTreeSet<&'a str>) {
        match self {
            CodeBlock::Definition(def) => {
                if let Some(name) = &def.name {
                    out.insert(name.as_str());
                }
                out.extend(def.parameters.iter().map(String::as_str));
            }
            CodeBlock::Action(action) => {
                out.extend(action.writes.iter().map(String::as_str));
                out.extend(action.reads.iter().map(String::as_str));
            }
            CodeBlock::Decision(dec) => {
                out.extend(dec.depends_on.iter().map(String::as_str));
            }
            CodeBlock::Text(_) => {}
        }
        for child in self.children() {
            child.collect_identifiers(out);
        }
    }

    /// The literal source text of this block.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.write_text(&mut out);
        out
    }

    /// Append the literal source text of this block to `out`.
    pub fn write_text(&self, out: &mut String) {
        match self {
            CodeBlock::Action(action) => out.push_str(&action.text),
            CodeBlock::Text(text) => out.push_str(&text.text),
            CodeBlock::Definition(_) | CodeBlock::Decision(_) => {
                for child in self.children() {
                    child.write_text(out);
                }
            }
        }
    }
}

/// Concatenate the text of a block list.
pub fn render(blocks: &[CodeBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        block.write_text(&mut out);
    }
    out
}
