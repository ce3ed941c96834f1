//! Provision detail views: content, breadcrumbs, children, references, and
//! defined-term usage, with section selection via options or an explicit
//! field list.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use xxhash_rust::xxh3::xxh3_64;

use query::{parse_flexible_token, ParsedToken};
use store::{Provision, ProvisionKind};

use crate::engine::UnifiedSearch;
use crate::SearchError;

/// Which sections of the detail payload to assemble. When `fields` is set it
/// wins over the individual flags: a section is included only if named.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DetailOptions {
    pub include_breadcrumbs: bool,
    pub include_children: bool,
    pub include_definitions: bool,
    pub include_references: bool,
    #[serde(default)]
    pub fields: Option<Vec<String>>,
}

impl Default for DetailOptions {
    fn default() -> Self {
        Self {
            include_breadcrumbs: true,
            include_children: true,
            include_definitions: true,
            include_references: true,
            fields: None,
        }
    }
}

impl DetailOptions {
    fn wants(&self, section: &str, flag: bool) -> bool {
        match &self.fields {
            Some(fields) => fields.iter().any(|f| f == section),
            None => flag,
        }
    }
}

/// An outbound citation of the provision.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReferenceTo {
    pub target_ref_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_internal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub target_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

/// An inbound citation pointing at the provision.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ReferencedBy {
    pub source_internal_id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct TermUsed {
    pub term_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub definition_internal_id: Option<String>,
}

/// A definition the provision relies on, resolved to its provision row.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DefinitionRef {
    pub internal_id: String,
    pub ref_id: String,
    pub title: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct BreadcrumbItem {
    pub internal_id: String,
    pub title: String,
}

#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct ChildItem {
    pub internal_id: String,
    pub ref_id: String,
    pub title: String,
    #[serde(rename = "type")]
    pub kind: ProvisionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sibling_order: Option<i32>,
}

/// The full detail payload.
#[derive(Serialize, Deserialize, Clone, Debug)]
pub struct DetailResponse {
    pub internal_id: String,
    pub ref_id: String,
    pub corpus_id: String,
    #[serde(rename = "type")]
    pub kind: ProvisionKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_id: Option<String>,
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_md: Option<String>,
    pub level: i32,
    pub hierarchy_path: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_internal_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sibling_order: Option<i32>,
    pub references_to: Vec<ReferenceTo>,
    pub referenced_by: Vec<ReferencedBy>,
    pub defined_terms_used: Vec<TermUsed>,
    pub definitions_with_references: Vec<DefinitionRef>,
    pub breadcrumbs: Vec<BreadcrumbItem>,
    pub children: Vec<ChildItem>,
    pub etag: String,
    pub last_modified: DateTime<Utc>,
    pub size_bytes: usize,
    /// Populated when the provision was resolved from a flexible citation
    /// token rather than a verbatim internal id.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parsed: Option<ParsedToken>,
}

impl UnifiedSearch {
    /// Detailed view of one provision. `id_or_token` is an internal id or a
    /// flexible citation token (`s 6-5`), resolved against `corpus_id`.
    pub fn provision_detail(
        &self,
        id_or_token: &str,
        corpus_id: &str,
        opts: &DetailOptions,
    ) -> Result<DetailResponse, SearchError> {
        let store = self.store();
        let mut parsed: Option<ParsedToken> = None;

        let provision: Provision = match store.get_provision(id_or_token.trim())? {
            Some(p) => p,
            None => {
                let token =
                    parse_flexible_token(id_or_token, corpus_id, self.parser().registry())
                        .ok_or_else(|| SearchError::NotFound(id_or_token.to_string()))?;
                let found = store
                    .find_provision_by_ref(&token.corpus, ProvisionKind::Section, &token.section)?
                    .or(store.find_provision_by_local(&token.corpus, &token.section)?)
                    .ok_or_else(|| SearchError::NotFound(id_or_token.to_string()))?;
                parsed = Some(token);
                found
            }
        };

        let id = provision.internal_id.clone();
        let ids = vec![id.clone()];

        let mut references_to = Vec::new();
        let mut referenced_by = Vec::new();
        if opts.wants("references", opts.include_references) {
            for r in store.references_from(&ids)? {
                let target_title = match r.target_internal_id.as_deref() {
                    Some(target) => store.get_provision(target)?.map(|p| p.title),
                    None => None,
                };
                references_to.push(ReferenceTo {
                    target_ref_id: r.target_ref_id,
                    target_internal_id: r.target_internal_id,
                    target_title,
                    snippet: r.snippet,
                });
            }
            for r in store.references_to(&ids)? {
                let source_title = store
                    .get_provision(&r.source_internal_id)?
                    .map(|p| p.title);
                referenced_by.push(ReferencedBy {
                    source_internal_id: r.source_internal_id,
                    source_title,
                    snippet: r.snippet,
                });
            }
        }

        let mut defined_terms_used = Vec::new();
        let mut definitions_with_references = Vec::new();
        if opts.wants("definitions", opts.include_definitions) {
            for usage in store.term_usages_from(&ids)? {
                if let Some(def_id) = usage.definition_internal_id.as_deref() {
                    if let Some(def) = store.get_provision(def_id)? {
                        definitions_with_references.push(DefinitionRef {
                            internal_id: def.internal_id,
                            ref_id: def.ref_id,
                            title: def.title,
                        });
                    }
                }
                defined_terms_used.push(TermUsed {
                    term_text: usage.term_text,
                    definition_internal_id: usage.definition_internal_id,
                });
            }
            defined_terms_used.sort_by(|a, b| a.term_text.cmp(&b.term_text));
            definitions_with_references.sort_by(|a, b| a.internal_id.cmp(&b.internal_id));
        }

        let mut breadcrumbs = Vec::new();
        if opts.wants("breadcrumbs", opts.include_breadcrumbs) {
            // Walk the parent chain, then flip to root → leaf order.
            let mut cursor = provision.parent_internal_id.clone();
            while let Some(parent_id) = cursor {
                let Some(parent) = store.get_provision(&parent_id)? else {
                    break;
                };
                cursor = parent.parent_internal_id.clone();
                breadcrumbs.push(BreadcrumbItem {
                    internal_id: parent.internal_id,
                    title: parent.title,
                });
            }
            breadcrumbs.reverse();
            breadcrumbs.push(BreadcrumbItem {
                internal_id: provision.internal_id.clone(),
                title: provision.title.clone(),
            });
        }

        let mut children = Vec::new();
        if opts.wants("children", opts.include_children) {
            for child in store.children_of(&provision.corpus_id, &id)? {
                children.push(ChildItem {
                    internal_id: child.internal_id,
                    ref_id: child.ref_id,
                    title: child.title,
                    kind: child.kind,
                    sibling_order: child.sibling_order,
                });
            }
        }

        let stamp = store.graph_version_stamp()?;
        let content = provision.content_md.clone().unwrap_or_default();
        let etag = format!(
            "{:016x}",
            xxh3_64(format!("{}|{}|{}", provision.ref_id, stamp.version, content).as_bytes())
        );
        let include_content = opts.wants("content_md", true);

        Ok(DetailResponse {
            internal_id: provision.internal_id,
            ref_id: provision.ref_id,
            corpus_id: provision.corpus_id,
            kind: provision.kind,
            local_id: provision.local_id,
            title: provision.title,
            size_bytes: content.len(),
            content_md: if include_content {
                provision.content_md
            } else {
                None
            },
            level: provision.level,
            hierarchy_path: provision.hierarchy_path,
            parent_internal_id: provision.parent_internal_id,
            sibling_order: provision.sibling_order,
            references_to,
            referenced_by,
            defined_terms_used,
            definitions_with_references,
            breadcrumbs,
            children,
            etag,
            last_modified: stamp.updated_at,
            parsed,
        })
    }
}
