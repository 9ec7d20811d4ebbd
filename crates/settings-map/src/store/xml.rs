//! XML-backed [`VariableStore`].
//!
//! Expected document shape:
//!
//! ```xml
//! <Root>
//!   <Variables>
//!     <StringVariable name="Theme" value="Dark" />
//!   </Variables>
//! </Root>
//! ```
//!
//! The root element may have any name.  Exactly one `Variables` element must
//! exist somewhere below it; that is where new variables are appended.
//! `StringVariable` elements are read from anywhere below the root, not only
//! from inside `Variables`, but may not contain other elements.
//!
//! The file is held as a lossless [`Document`]: everything outside the
//! variable nodes is written back exactly as it was read, including
//! namespace prefixes, CDATA sections, comments and processing instructions
//! around the root element.  New variable nodes follow the indentation of
//! their siblings.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use tracing::{debug, trace};

use super::document::{is_valid_name, Document, Element, Node};
use super::{Entry, StoreOptions, VariableStore};
use crate::error::{LoadError, SchemaError, SettingsError, WriteError};

/// Element that marks the insertion point for new variables.
pub const VARIABLES_TAG: &str = "Variables";
/// Element that holds one name/value pair.
pub const VARIABLE_TAG: &str = "StringVariable";

const NAME_ATTR: &str = "name";
const VALUE_ATTR: &str = "value";

/// A settings document loaded from, and saved back to, a single file path.
#[derive(Debug)]
pub struct XmlVariableStore {
    path: PathBuf,
    document: Document,
    options: StoreOptions,
}

impl XmlVariableStore {
    /// Opens an existing settings file with default formatting options.
    ///
    /// # Errors
    ///
    /// [`LoadError::Io`] if the file cannot be read, [`LoadError::Parse`] if it
    /// is not well-formed XML, and [`SchemaError`] if it does not contain
    /// exactly one `Variables` element.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::open_with_options(path, StoreOptions::default())
    }

    /// Opens an existing settings file.
    ///
    /// # Errors
    ///
    /// Same as [`XmlVariableStore::open`].
    pub fn open_with_options(
        path: impl AsRef<Path>,
        options: StoreOptions,
    ) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();

        let text = fs::read_to_string(&path).map_err(|source| LoadError::Io {
            path: path.clone(),
            source,
        })?;
        let document = Document::parse(&text).map_err(|source| LoadError::Parse {
            path: path.clone(),
            source,
        })?;

        debug!(path = %path.display(), root = %document.root().name(), "loaded settings document");
        Self::from_document(path, document, options)
    }

    /// Creates a new settings file containing `<root_name><Variables/></root_name>`.
    ///
    /// Never overwrites: an existing file at `path` is an error.  If the
    /// skeleton cannot be written, the partly written file is removed again.
    ///
    /// # Errors
    ///
    /// [`LoadError::InvalidName`] if `root_name` is not an XML name,
    /// [`LoadError::AlreadyExists`] if the file exists, [`LoadError::Io`] if
    /// it cannot be created, and [`SettingsError::Write`] if the skeleton
    /// cannot be written.
    pub fn create(
        path: impl AsRef<Path>,
        root_name: &str,
        options: StoreOptions,
    ) -> Result<Self, SettingsError> {
        let path = path.as_ref().to_path_buf();
        if !is_valid_name(root_name) {
            return Err(LoadError::InvalidName {
                name: root_name.to_string(),
            }
            .into());
        }

        let store = Self::from_document(path, skeleton(root_name, &options), options)?;

        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&store.path)
            .map_err(|source| match source.kind() {
                ErrorKind::AlreadyExists => LoadError::AlreadyExists {
                    path: store.path.clone(),
                },
                _ => LoadError::Io {
                    path: store.path.clone(),
                    source,
                },
            })?;
        write_new_file(&store.path, file, store.render().as_bytes())?;

        debug!(path = %store.path.display(), "created settings document");
        Ok(store)
    }

    fn from_document(
        path: PathBuf,
        document: Document,
        options: StoreOptions,
    ) -> Result<Self, SettingsError> {
        match count_named(document.root(), VARIABLES_TAG) {
            0 => Err(SchemaError::MissingVariables.into()),
            1 => Ok(Self {
                path,
                document,
                options,
            }),
            n => Err(SchemaError::MultipleVariables(n).into()),
        }
    }

    /// Path every save is written to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Formatting options applied on save.
    pub fn options(&self) -> &StoreOptions {
        &self.options
    }

    /// The in-memory document.
    pub fn document(&self) -> &Document {
        &self.document
    }

    /// The root element of the in-memory document.
    pub fn root(&self) -> &Element {
        self.document.root()
    }

    fn render(&self) -> String {
        self.document.to_xml(&self.options)
    }

    fn append_variable(&mut self, node: Element) {
        let root = self.document.root_mut();
        let Some(path) = path_to(root, &|e| e.name == VARIABLES_TAG) else {
            // Only reachable if `Variables` was never there; recreate it.
            let mut variables = Element::new(VARIABLES_TAG);
            variables.children.push(Node::Element(node));
            root.children.push(Node::Element(variables));
            return;
        };

        let own_indent = path.split_last().and_then(|(&index, parent_path)| {
            element_at_mut(root, parent_path)
                .and_then(|parent| blank_before(parent, index))
                .map(str::to_string)
        });
        if let Some(variables) = element_at_mut(root, &path) {
            append_with_layout(variables, node, own_indent.as_deref(), &self.options);
        }
    }
}

impl VariableStore for XmlVariableStore {
    fn load(&self) -> Result<Vec<Entry>, SchemaError> {
        let mut nodes = Vec::new();
        collect_named(self.document.root(), VARIABLE_TAG, &mut nodes);

        nodes
            .iter()
            .enumerate()
            .map(|(index, node)| {
                if node.elements().next().is_some() {
                    return Err(SchemaError::NestedElement { index });
                }
                let name = node.attribute(NAME_ATTR).ok_or(SchemaError::MissingAttribute {
                    index,
                    attribute: NAME_ATTR,
                })?;
                let value = node.attribute(VALUE_ATTR).ok_or(SchemaError::MissingAttribute {
                    index,
                    attribute: VALUE_ATTR,
                })?;
                Ok(Entry::new(name, value))
            })
            .collect()
    }

    fn upsert(&mut self, name: &str, value: &str) {
        if let Some(node) = find_mut(self.document.root_mut(), &|e| is_variable_named(e, name)) {
            node.set_attribute(VALUE_ATTR, value);
            trace!(name, "updated variable node");
            return;
        }

        let mut node = Element::new(VARIABLE_TAG);
        node.set_attribute(NAME_ATTR, name);
        node.set_attribute(VALUE_ATTR, value);
        self.append_variable(node);
        trace!(name, "appended variable node");
    }

    fn remove(&mut self, name: &str) -> bool {
        let removed = detach_first(self.document.root_mut(), name);
        if removed {
            trace!(name, "detached variable node");
        }
        removed
    }

    fn clear(&mut self) -> usize {
        let removed = detach_all(self.document.root_mut());
        trace!(removed, "detached all variable nodes");
        removed
    }

    fn save(&self) -> Result<(), WriteError> {
        let xml = self.render();
        fs::write(&self.path, &xml).map_err(|source| WriteError::Io {
            path: self.path.clone(),
            source,
        })?;

        debug!(path = %self.path.display(), bytes = xml.len(), "flushed settings document");
        Ok(())
    }
}

/// `<root_name><Variables/></root_name>`, laid out per `options`.
fn skeleton(root_name: &str, options: &StoreOptions) -> Document {
    let mut root = Element::new(root_name);
    let variables = Node::Element(Element::new(VARIABLES_TAG));
    if !options.indent {
        root.children.push(variables);
        return Document::new(root, Vec::new());
    }
    root.children.push(Node::Text(format!("\n{}", options.indent_string)));
    root.children.push(variables);
    root.children.push(Node::Text("\n".to_string()));
    Document::new(root, vec![Node::Text("\n".to_string())])
}

/// Writes the first content of a freshly created file.  On failure the file
/// is removed so that a retried create finds the path free.
fn write_new_file(path: &Path, mut file: impl Write, bytes: &[u8]) -> Result<(), WriteError> {
    if let Err(source) = file.write_all(bytes).and_then(|()| file.flush()) {
        if let Err(e) = fs::remove_file(path) {
            debug!(path = %path.display(), error = %e, "could not remove partial settings file");
        }
        return Err(WriteError::Io {
            path: path.to_path_buf(),
            source,
        });
    }
    Ok(())
}

// ── Tree helpers ──────────────────────────────────────────────────────────────
//
// All helpers walk descendants in document order (pre-order), never the root
// element itself.

fn is_variable_named(element: &Element, name: &str) -> bool {
    element.name == VARIABLE_TAG && element.attribute(NAME_ATTR).is_some_and(|n| n == name)
}

fn count_named(parent: &Element, tag: &str) -> usize {
    parent
        .elements()
        .map(|child| usize::from(child.name == tag) + count_named(child, tag))
        .sum()
}

fn collect_named<'a>(parent: &'a Element, tag: &str, out: &mut Vec<&'a Element>) {
    for child in parent.elements() {
        if child.name == tag {
            out.push(child);
        }
        collect_named(child, tag, out);
    }
}

fn find_mut<'a>(
    parent: &'a mut Element,
    matches: &dyn Fn(&Element) -> bool,
) -> Option<&'a mut Element> {
    for node in parent.children.iter_mut() {
        if let Node::Element(child) = node {
            if matches(child) {
                return Some(child);
            }
            if let Some(found) = find_mut(child, matches) {
                return Some(found);
            }
        }
    }
    None
}

/// Child indices leading from `parent` to the first matching descendant.
fn path_to(parent: &Element, matches: &dyn Fn(&Element) -> bool) -> Option<Vec<usize>> {
    for (index, node) in parent.children.iter().enumerate() {
        if let Node::Element(child) = node {
            if matches(child) {
                return Some(vec![index]);
            }
            if let Some(mut rest) = path_to(child, matches) {
                rest.insert(0, index);
                return Some(rest);
            }
        }
    }
    None
}

fn element_at_mut<'a>(mut current: &'a mut Element, path: &[usize]) -> Option<&'a mut Element> {
    for &index in path {
        current = match current.children.get_mut(index)? {
            Node::Element(child) => child,
            _ => return None,
        };
    }
    Some(current)
}

/// The whitespace text directly before `parent.children[index]`, if any.
fn blank_before(parent: &Element, index: usize) -> Option<&str> {
    let previous = parent.children.get(index.checked_sub(1)?)?;
    match previous {
        Node::Text(raw) if previous.is_blank() => Some(raw.as_str()),
        _ => None,
    }
}

/// Appends `child` to `parent`, copying the indentation of existing element
/// children, or deriving it from `own_indent` (the whitespace before
/// `parent`'s start tag) when there are none.  Documents without
/// indentation stay compact.
fn append_with_layout(
    parent: &mut Element,
    child: Element,
    own_indent: Option<&str>,
    options: &StoreOptions,
) {
    let sibling_indent = (0..parent.children.len())
        .filter(|&i| matches!(parent.children[i], Node::Element(_)))
        .find_map(|i| blank_before(parent, i))
        .map(str::to_string);
    let has_elements = parent.elements().next().is_some();

    let child_indent = match (options.indent, sibling_indent, own_indent) {
        (false, _, _) => None,
        (true, Some(indent), _) => Some(indent),
        (true, None, Some(own)) if !has_elements => Some(format!("{own}{}", options.indent_string)),
        _ => None,
    };
    let Some(child_indent) = child_indent else {
        parent.children.push(Node::Element(child));
        return;
    };

    if !has_elements {
        parent.children.retain(|node| !node.is_blank());
    }
    let tail = match parent.children.last() {
        Some(node) if node.is_blank() => parent.children.pop(),
        _ => None,
    };
    let tail = tail.unwrap_or_else(|| Node::Text(own_indent.unwrap_or("\n").to_string()));

    parent.children.push(Node::Text(child_indent));
    parent.children.push(Node::Element(child));
    parent.children.push(tail);
}

/// Removes `parent.children[index]` together with the indentation before it.
fn detach_at(parent: &mut Element, index: usize) {
    parent.children.remove(index);
    if blank_before(parent, index).is_some() {
        parent.children.remove(index - 1);
    }
}

fn detach_first(parent: &mut Element, name: &str) -> bool {
    for i in 0..parent.children.len() {
        let hit = matches!(&parent.children[i], Node::Element(child) if is_variable_named(child, name));
        if hit {
            detach_at(parent, i);
            return true;
        }
        if let Node::Element(child) = &mut parent.children[i] {
            if detach_first(child, name) {
                return true;
            }
        }
    }
    false
}

fn detach_all(parent: &mut Element) -> usize {
    let mut removed = 0;
    let mut kept: Vec<Node> = Vec::with_capacity(parent.children.len());
    for node in std::mem::take(&mut parent.children) {
        if matches!(&node, Node::Element(child) if child.name == VARIABLE_TAG) {
            removed += 1;
            if kept.last().is_some_and(Node::is_blank) {
                kept.pop();
            }
            continue;
        }
        kept.push(node);
    }
    parent.children = kept;

    for node in parent.children.iter_mut() {
        if let Node::Element(child) = node {
            removed += detach_all(child);
        }
    }
    removed
}

// ── Tests ─────────────────────────────────────────────────────────────────────
