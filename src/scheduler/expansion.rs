//! Turning a resolved index into child tasks.

use crate::document::{Document, DocumentKind};
use crate::error::{Error, Result};
use crate::identifier::ArtifactCode;
use std::sync::Arc;

/// A task to append, in order
#[derive(Clone, Debug, PartialEq, Eq)]
pub(crate) struct Child {
    pub(crate) code: ArtifactCode,
    pub(crate) index: bool,
}

/// Children of an index, in queue order: elements (only when content is
/// requested), then sub-indexes, then the appended index
pub(crate) fn children(doc: &Document, expand_content: bool) -> Result<Vec<Child>> {
    let DocumentKind::Index(index) = doc.kind()? else {
        return Err(Error::NotAnIndex(doc.uri.clone()));
    };

    let mut children = Vec::new();
    if expand_content {
        for element in &index.elements {
            children.push(Child {
                code: member_code(doc, element)?,
                index: false,
            });
        }
    }
    for sub in index.sub_indexes.iter().chain(index.appended_index.iter()) {
        children.push(Child {
            code: member_code(doc, sub)?,
            index: true,
        });
    }
    Ok(children)
}

fn member_code(doc: &Document, member: &str) -> Result<ArtifactCode> {
    ArtifactCode::parse(member).map_err(|_| Error::MalformedIndex {
        uri: doc.uri.clone(),
        reason: format!("member {member} is not a content-addressed URI"),
    })
}

/// Chain of index codes from the root down to one index task
///
/// Each index task holds its own chain, so an index reached through two
/// different parents is fine; only an index that includes or appends one of
/// its own ancestors is a cycle.
#[derive(Debug)]
pub(crate) struct Lineage {
    code: ArtifactCode,
    parent: Option<Arc<Lineage>>,
}

impl Lineage {
    pub(crate) fn root(code: ArtifactCode) -> Arc<Self> {
        Arc::new(Self { code, parent: None })
    }

    fn contains(&self, code: &ArtifactCode) -> bool {
        let mut link = Some(self);
        while let Some(current) = link {
            if current.code == *code {
                return true;
            }
            link = current.parent.as_deref();
        }
        false
    }

    /// Chain for a child index of this one
    pub(crate) fn descend(self: &Arc<Self>, child: &ArtifactCode) -> Result<Arc<Self>> {
        if self.contains(child) {
            return Err(Error::IndexCycle(child.to_string()));
        }
        Ok(Arc::new(Self {
            code: child.clone(),
            parent: Some(Arc::clone(self)),
        }))
    }
}

// Appended-index chains can be long; unlink iteratively instead of recursing
impl Drop for Lineage {
    fn drop(&mut self) {
        let mut parent = self.parent.take();
        while let Some(link) = parent {
            parent = match Arc::try_unwrap(link) {
                Ok(mut owned) => owned.parent.take(),
                Err(_) => None,
            };
        }
    }
}
