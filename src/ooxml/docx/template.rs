//! Placeholder substitution for document templates.
//!
//! A [`Template`] maps keys to replacement text and rewrites every
//! `{{key}}` occurrence in the body, tables, headers and footers of a
//! [`Document`]. Word often splits what the user typed as one placeholder
//! over several runs, so matching works on the concatenated text of each
//! run sequence. The first run a placeholder touches receives the replacement
//! and keeps its formatting; runs consumed entirely by the placeholder are
//! removed.
//!
//! # Example
//!
//! ```rust,no_run
//! use quince::ooxml::docx::{Document, Template};
//!
//! let mut doc = Document::open("invoice-template.docx")?;
//! let mut template = Template::new();
//! template.set("customer", "Ada Lovelace").set("total", "42.00");
//! let replaced = template.replace_all(&mut doc);
//! println!("{replaced} placeholders filled");
//! doc.save_as("invoice.docx")?;
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use std::collections::{BTreeMap, BTreeSet};

use memchr::memmem;
use tracing::debug;

use crate::common::xml::XmlElement;
use crate::ooxml::docx::document::Document;
use crate::ooxml::docx::paragraph::{PARAGRAPH, Paragraph, ParagraphMut, RUN, collect_run_text, write_run_text};

const DEFAULT_PREFIX: &str = "{{";
const DEFAULT_SUFFIX: &str = "}}";

/// Elements inside a paragraph whose direct runs form their own sequence.
const RUN_CONTAINERS: &[&str] = &["w:hyperlink", "w:smartTag"];

/// One placeholder occurrence: byte span of the whole placeholder and the
/// key between the delimiters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Placeholder<'t> {
    start: usize,
    end: usize,
    key: &'t str,
}

/// Find placeholders in `text`, left to right and non-overlapping.
///
/// A candidate whose key is rejected by `accept` is skipped by its prefix
/// only, so `{{ {{name}}` still yields `name`.
fn scan<'t>(text: &'t str, prefix: &str, suffix: &str, accept: impl Fn(&str) -> bool) -> Vec<Placeholder<'t>> {
    let mut found = Vec::new();
    if prefix.is_empty() || suffix.is_empty() {
        return found;
    }
    let bytes = text.as_bytes();
    let prefix_finder = memmem::Finder::new(prefix);
    let suffix_finder = memmem::Finder::new(suffix);

    let mut pos = 0;
    while let Some(found_at) = prefix_finder.find(&bytes[pos..]) {
        let start = pos + found_at;
        let key_start = start + prefix.len();
        let Some(key_len) = suffix_finder.find(&bytes[key_start..]) else {
            break;
        };
        let key = &text[key_start..key_start + key_len];
        if accept(key) {
            let end = key_start + key_len + suffix.len();
            found.push(Placeholder { start, end, key });
            pos = end;
        } else {
            pos = key_start;
        }
    }
    found
}

/// Index of the run containing byte `offset` of the concatenated text.
fn run_at(starts: &[usize], offset: usize) -> usize {
    starts.partition_point(|&start| start <= offset).saturating_sub(1)
}

/// Key/value placeholder substitution.
#[derive(Debug, Clone)]
pub struct Template {
    values: BTreeMap<String, String>,
    prefix: String,
    suffix: String,
}

impl Default for Template {
    fn default() -> Self {
        Self {
            values: BTreeMap::new(),
            prefix: DEFAULT_PREFIX.to_string(),
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }
}

impl Template {
    /// Create a template matching `{{key}}`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Use custom delimiters such as `${` and `}`.
    ///
    /// Empty delimiters match nothing.
    pub fn with_delimiters<P: Into<String>, S: Into<String>>(mut self, prefix: P, suffix: S) -> Self {
        self.set_delimiters(prefix, suffix);
        self
    }

    pub fn set_delimiters<P: Into<String>, S: Into<String>>(&mut self, prefix: P, suffix: S) {
        self.prefix = prefix.into();
        self.suffix = suffix.into();
    }

    #[inline]
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    #[inline]
    pub fn suffix(&self) -> &str {
        &self.suffix
    }

    /// Set the replacement for `key`; keys match exactly, without trimming.
    pub fn set<K: Into<String>, V: Into<String>>(&mut self, key: K, value: V) -> &mut Self {
        self.values.insert(key.into(), value.into());
        self
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.values.get(key).map(String::as_str)
    }

    pub fn remove(&mut self, key: &str) -> Option<String> {
        self.values.remove(key)
    }

    pub fn clear(&mut self) {
        self.values.clear();
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Substitute placeholders in a plain string.
    pub fn render(&self, text: &str) -> String {
        let mut out = String::with_capacity(text.len());
        let mut last = 0;
        for placeholder in scan(text, &self.prefix, &self.suffix, |key| self.values.contains_key(key)) {
            out.push_str(&text[last..placeholder.start]);
            out.push_str(&self.values[placeholder.key]);
            last = placeholder.end;
        }
        out.push_str(&text[last..]);
        out
    }

    /// Fill placeholders in the main document body (tables and content
    /// controls included) and in every header and footer.
    ///
    /// Placeholders without a value are left untouched. Parts without a
    /// single delimiter are not touched, so they are saved byte for byte.
    ///
    /// Returns the number of placeholders replaced.
    pub fn replace_all(&self, doc: &mut Document) -> usize {
        if self.values.is_empty() {
            return 0;
        }
        let mut paths: Vec<String> = doc.package().main_document_path().into_iter().collect();
        paths.extend(doc.header_paths());
        paths.extend(doc.footer_paths());

        let package = doc.package_mut();
        let mut total = 0;
        for path in &paths {
            let candidate = package
                .xml_part(path)
                .is_some_and(|part| self.mentions_prefix(part.root()));
            if !candidate {
                continue;
            }
            if let Some(part) = package.xml_part_mut(path) {
                let replaced = self.replace_in_tree(part.root_mut());
                debug!(part = %path, replaced, "template applied");
                total += replaced;
            }
        }
        total
    }

    /// Fill placeholders in one paragraph.
    pub fn replace_in_paragraph(&self, paragraph: &mut ParagraphMut<'_>) -> usize {
        self.replace_in_paragraph_element(paragraph.element_mut())
    }

    /// Distinct placeholder keys present in the document, whether or not
    /// this template has a value for them.
    pub fn find_placeholders(&self, doc: &Document) -> BTreeSet<String> {
        let mut paths: Vec<String> = doc.package().main_document_path().into_iter().collect();
        paths.extend(doc.header_paths());
        paths.extend(doc.footer_paths());

        let mut keys = BTreeSet::new();
        for path in &paths {
            if let Some(part) = doc.package().xml_part(path) {
                self.collect_keys(part.root(), &mut keys);
            }
        }
        keys
    }

    fn collect_keys(&self, element: &XmlElement, keys: &mut BTreeSet<String>) {
        for child in element.elements() {
            if child.name() == PARAGRAPH {
                let text = Paragraph::new(child).text();
                let is_key = |key: &str| !key.is_empty() && !key.contains(self.prefix.as_str());
                for placeholder in scan(&text, &self.prefix, &self.suffix, is_key) {
                    keys.insert(placeholder.key.to_string());
                }
            } else {
                self.collect_keys(child, keys);
            }
        }
    }

    fn mentions_prefix(&self, element: &XmlElement) -> bool {
        element.elements().any(|child| {
            if child.name() == PARAGRAPH {
                Paragraph::new(child).text().contains(self.prefix.as_str())
            } else {
                self.mentions_prefix(child)
            }
        })
    }

    fn replace_in_tree(&self, element: &mut XmlElement) -> usize {
        element
            .elements_mut()
            .map(|child| {
                if child.name() == PARAGRAPH {
                    self.replace_in_paragraph_element(child)
                } else {
                    self.replace_in_tree(child)
                }
            })
            .sum()
    }

    fn replace_in_paragraph_element(&self, paragraph: &mut XmlElement) -> usize {
        let mut replaced = self.replace_in_runs(paragraph);
        for child in paragraph.elements_mut() {
            if child.name() == "w:sdt" {
                if let Some(content) = child.child_mut("w:sdtContent") {
                    replaced += self.replace_in_runs(content);
                }
            } else if RUN_CONTAINERS.contains(&child.name()) {
                replaced += self.replace_in_runs(child);
            }
        }
        replaced
    }

    /// Replace placeholders across the direct runs of `container`.
    fn replace_in_runs(&self, container: &mut XmlElement) -> usize {
        let positions: Vec<usize> = container
            .children()
            .iter()
            .enumerate()
            .filter(|(_, node)| node.as_element().is_some_and(|e| e.name() == RUN))
            .map(|(i, _)| i)
            .collect();
        if positions.is_empty() {
            return 0;
        }

        let mut texts: Vec<String> = positions
            .iter()
            .map(|&pos| {
                let mut text = String::new();
                if let Some(run) = container.children()[pos].as_element() {
                    collect_run_text(run, &mut text);
                }
                text
            })
            .collect();
        let full = texts.concat();
        let placeholders = scan(&full, &self.prefix, &self.suffix, |key| self.values.contains_key(key));
        if placeholders.is_empty() {
            return 0;
        }

        let starts: Vec<usize> = texts
            .iter()
            .scan(0, |offset, text| {
                let start = *offset;
                *offset += text.len();
                Some(start)
            })
            .collect();
        let mut dirty = vec![false; texts.len()];
        let mut dropped = vec![false; texts.len()];

        // Right to left, so offsets of earlier placeholders stay valid.
        for placeholder in placeholders.iter().rev() {
            let value = self.values[placeholder.key].as_str();
            let first = run_at(&starts, placeholder.start);
            let last = run_at(&starts, placeholder.end - 1);
            let local_start = placeholder.start - starts[first];

            if first == last {
                let local_end = placeholder.end - starts[first];
                texts[first].replace_range(local_start..local_end, value);
            } else {
                texts[first].replace_range(local_start.., value);
                for i in first + 1..last {
                    texts[i].clear();
                    dropped[i] = true;
                }
                texts[last].replace_range(..placeholder.end - starts[last], "");
                dirty[last] = true;
                dropped[last] = texts[last].is_empty();
            }
            dirty[first] = true;
        }

        for (i, &pos) in positions.iter().enumerate().rev() {
            if dropped[i] {
                container.remove(pos);
            } else if dirty[i]
                && let Some(run) = container.children_mut()[pos].as_element_mut()
            {
                write_run_text(run, &texts[i]);
            }
        }
        placeholders.len()
    }
}
