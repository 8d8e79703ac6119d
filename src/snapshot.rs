//! Cross-frame hybrid DOM + accessibility snapshot.
//!
//! One protocol DOM crawl per session feeds per-frame XPath maps; one
//! accessibility tree per frame feeds the outline. Frames are stitched
//! top-down: child outlines are injected under their host iframe's line and
//! child XPaths are prefixed with the host's absolute XPath, so every node on
//! the page is addressable through a single `EncodedId` keyed map.

use std::collections::HashMap;
use std::sync::Arc;

use chromiumoxide_cdp::cdp::browser_protocol::accessibility::{
    AxNode, GetFullAxTreeParams,
};
use chromiumoxide_cdp::cdp::browser_protocol::dom::{
    BackendNodeId, GetDocumentParams, GetFrameOwnerParams, Node,
};
use chromiumoxide_cdp::cdp::browser_protocol::page::FrameId;
use chromiumoxide_cdp::cdp::browser_protocol::target::SessionId;

use crate::element::Element;
use crate::error::{CdpError, Result};
use crate::handler::PageInner;
use crate::locator::Locator;

/// `{frame-ordinal}-{backendNodeId}`: the primary key across snapshot
/// outputs. Ordinals are assigned first-seen per page and survive root swaps.
pub type EncodedId = String;

pub(crate) fn encode_id(ordinal: u32, backend_id: i64) -> EncodedId {
    format!("{ordinal}-{backend_id}")
}

/// What [`capture`] returns
#[derive(Debug, Clone, Default)]
pub struct HybridSnapshot {
    /// The merged accessibility outline of all frames
    pub combined_tree: String,
    /// EncodedId → absolute XPath (prefixed through the iframe chain)
    pub combined_xpath_map: HashMap<EncodedId, String>,
    /// EncodedId → URL of the containing document
    pub combined_url_map: HashMap<EncodedId, String>,
}

#[derive(Debug, Clone, Default)]
pub struct SnapshotOptions {
    /// Resolve only the iframe chain this selector needs and scope the
    /// outline to its subtree. Falls back to the full snapshot on any
    /// failure.
    pub focus_selector: Option<String>,
}

pub(crate) async fn capture(
    inner: &Arc<PageInner>,
    options: SnapshotOptions,
) -> Result<HybridSnapshot> {
    if let Some(selector) = options.focus_selector.as_deref() {
        match capture_focused(inner, selector).await {
            Ok(snapshot) => return Ok(snapshot),
            Err(err) => {
                tracing::debug!("focused snapshot failed ({err}), taking full snapshot");
            }
        }
    }
    capture_full(inner).await
}

/// Decode a wrapper id into the raw protocol integer
fn backend_i64(id: &BackendNodeId) -> i64 {
    serde_json::to_value(id)
        .ok()
        .and_then(|v| v.as_i64())
        .unwrap_or_default()
}

fn ax_id(id: &chromiumoxide_cdp::cdp::browser_protocol::accessibility::AxNodeId) -> String {
    serde_json::to_value(id)
        .ok()
        .and_then(|v| v.as_str().map(str::to_string))
        .unwrap_or_default()
}

fn ax_value_str(
    value: &Option<chromiumoxide_cdp::cdp::browser_protocol::accessibility::AxValue>,
) -> String {
    value
        .as_ref()
        .and_then(|v| v.value.as_ref())
        .map(|v| match v {
            serde_json::Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .unwrap_or_default()
}

/// Everything the protocol DOM crawl of one session yields
#[derive(Debug, Default)]
pub(crate) struct DomIndex {
    /// backend id → (containing document root backend id, XPath local to
    /// that document)
    paths: HashMap<i64, (i64, String)>,
    /// backend id → element tag
    tags: HashMap<i64, String>,
    /// backend ids the renderer reports as scroll containers
    scrollable: std::collections::HashSet<i64>,
    /// host iframe backend id → content document root backend id, for
    /// same-session frames
    iframe_content: HashMap<i64, i64>,
    /// the session's own top document root
    root_doc: i64,
}

impl DomIndex {
    /// The local xpath map of one document within this session
    fn document_paths(&self, doc_root: i64) -> HashMap<i64, String> {
        self.paths
            .iter()
            .filter(|(_, (root, _))| *root == doc_root)
            .map(|(backend, (_, path))| (*backend, path.clone()))
            .collect()
    }
}

/// One step of a qualified XPath: per sibling group `tag[n]`, `text()[n]`,
/// `comment()[n]`, namespaced tags as `*[name()='ns:tag'][n]`.
fn xpath_step(node: &Node, position: usize) -> Option<String> {
    match node.node_type {
        1 => {
            if node.node_name.contains(':') {
                Some(format!(
                    "*[name()='{}'][{}]",
                    node.node_name.to_lowercase(),
                    position
                ))
            } else {
                Some(format!("{}[{}]", node.local_name, position))
            }
        }
        3 => Some(format!("text()[{position}]")),
        8 => Some(format!("comment()[{position}]")),
        _ => None,
    }
}

/// Key used to group siblings when computing positional qualifiers
fn sibling_key(node: &Node) -> Option<String> {
    match node.node_type {
        1 => Some(node.node_name.to_lowercase()),
        3 => Some("#text".to_string()),
        8 => Some("#comment".to_string()),
        _ => None,
    }
}

pub(crate) fn index_session_document(root: &Node) -> DomIndex {
    let mut index = DomIndex::default();
    index.root_doc = backend_i64(&root.backend_node_id);
    walk_document(root, index.root_doc, "", &mut index);
    index
}

fn walk_document(node: &Node, doc_root: i64, prefix: &str, index: &mut DomIndex) {
    // positional qualifiers restart per parent and per sibling group
    let mut positions: HashMap<String, usize> = HashMap::new();

    for child in node.children.iter().flatten() {
        let Some(key) = sibling_key(child) else {
            continue;
        };
        let position = positions.entry(key).or_insert(0);
        *position += 1;
        let Some(step) = xpath_step(child, *position) else {
            continue;
        };
        let path = format!("{prefix}/{step}");
        let backend = backend_i64(&child.backend_node_id);

        index.paths.insert(backend, (doc_root, path.clone()));
        if child.node_type == 1 {
            index.tags.insert(backend, child.local_name.clone());
            if child.is_scrollable.unwrap_or_default() {
                index.scrollable.insert(backend);
            }
        }

        // a shadow root crosses into a document fragment: its content hangs
        // off a descendant hop rather than a child step
        for shadow in child.shadow_roots.iter().flatten() {
            walk_fragment(shadow, doc_root, &path, index);
        }

        // a same-session iframe carries its content document inline
        if let Some(content) = child.content_document.as_ref() {
            let content_root = backend_i64(&content.backend_node_id);
            index.iframe_content.insert(backend, content_root);
            walk_document(content, content_root, "", index);
        }

        walk_document(child, doc_root, &path, index);
    }
}

fn walk_fragment(fragment: &Node, doc_root: i64, host_path: &str, index: &mut DomIndex) {
    let mut positions: HashMap<String, usize> = HashMap::new();
    for child in fragment.children.iter().flatten() {
        let Some(key) = sibling_key(child) else {
            continue;
        };
        let position = positions.entry(key).or_insert(0);
        *position += 1;
        let Some(step) = xpath_step(child, *position) else {
            continue;
        };
        let path = format!("{host_path}//{step}");
        let backend = backend_i64(&child.backend_node_id);

        index.paths.insert(backend, (doc_root, path.clone()));
        if child.node_type == 1 {
            index.tags.insert(backend, child.local_name.clone());
            if child.is_scrollable.unwrap_or_default() {
                index.scrollable.insert(backend);
            }
        }

        for shadow in child.shadow_roots.iter().flatten() {
            walk_fragment(shadow, doc_root, &path, index);
        }
        if let Some(content) = child.content_document.as_ref() {
            let content_root = backend_i64(&content.backend_node_id);
            index.iframe_content.insert(backend, content_root);
            walk_document(content, content_root, "", index);
        }
        walk_document(child, doc_root, &path, index);
    }
}

/// A lightweight accessibility node ready for outline rendering
#[derive(Debug, Clone, Default)]
pub(crate) struct AxLite {
    pub role: String,
    pub name: String,
    pub description: String,
    pub ignored: bool,
    pub backend: Option<i64>,
    pub children: Vec<String>,
}

pub(crate) fn ax_lite_map(nodes: &[AxNode]) -> (Vec<String>, HashMap<String, AxLite>) {
    let mut map = HashMap::new();
    let mut referenced = std::collections::HashSet::new();
    let mut order = Vec::new();

    for node in nodes {
        let id = ax_id(&node.node_id);
        let children: Vec<String> = node
            .child_ids
            .iter()
            .flatten()
            .map(ax_id)
            .collect();
        referenced.extend(children.iter().cloned());
        order.push(id.clone());
        map.insert(
            id,
            AxLite {
                role: ax_value_str(&node.role),
                name: ax_value_str(&node.name),
                description: ax_value_str(&node.description),
                ignored: node.ignored,
                backend: node.backend_dom_node_id.as_ref().map(backend_i64),
                children,
            },
        );
    }

    let roots: Vec<String> = order
        .iter()
        .filter(|id| !referenced.contains(*id))
        .cloned()
        .collect();
    (roots, map)
}

/// One rendered outline line, kept structured until frame injection is done
#[derive(Debug, Clone)]
pub(crate) struct OutlineLine {
    pub indent: usize,
    pub text: String,
    /// The encoded id this line stands for, when it maps to a DOM node
    pub encoded: Option<EncodedId>,
    pub backend: Option<i64>,
}

/// Roles that exist for layout, not meaning
fn is_structural(role: &str) -> bool {
    matches!(role, "generic" | "none" | "InlineTextBox" | "inlinetextbox")
}

pub(crate) struct OutlineContext<'a> {
    pub ordinal: u32,
    pub tags: &'a HashMap<i64, String>,
    pub scrollable: &'a std::collections::HashSet<i64>,
}

/// Render the accessibility tree into outline lines, applying the pruning
/// and decoration rules.
pub(crate) fn render_outline(
    roots: &[String],
    map: &HashMap<String, AxLite>,
    ctx: &OutlineContext<'_>,
) -> Vec<OutlineLine> {
    let mut out = Vec::new();
    for root in roots {
        render_node(root, map, ctx, 0, &mut out);
    }
    out
}

fn render_node(
    id: &str,
    map: &HashMap<String, AxLite>,
    ctx: &OutlineContext<'_>,
    depth: usize,
    out: &mut Vec<OutlineLine>,
) {
    let Some(node) = map.get(id) else {
        return;
    };

    if node.ignored {
        for child in &node.children {
            render_node(child, map, ctx, depth, out);
        }
        return;
    }

    let tag = node
        .backend
        .and_then(|b| ctx.tags.get(&b))
        .cloned()
        .unwrap_or_default();

    let mut role = node.role.clone();

    if is_structural(&role) && node.name.is_empty() && node.description.is_empty() {
        match node.children.len() {
            0 => return,
            1 => {
                // hoisting a lone child keeps it attached to the outline
                render_node(&node.children[0], map, ctx, depth, out);
                return;
            }
            _ => {
                role = if tag.is_empty() { "div".to_string() } else { tag.clone() };
            }
        }
    } else if is_structural(&role) {
        // described wrappers survive, under their tag name
        role = if tag.is_empty() { "div".to_string() } else { tag.clone() };
    }

    if role == "combobox" && tag == "select" {
        role = "select".to_string();
    }

    let scrollable = node
        .backend
        .map(|b| ctx.scrollable.contains(&b))
        .unwrap_or_default();
    if scrollable || tag == "html" {
        role = format!("scrollable, {}", if tag.is_empty() { role.clone() } else { tag.clone() });
    }

    let encoded = node.backend.map(|b| encode_id(ctx.ordinal, b));
    let label = match encoded.as_ref() {
        Some(encoded) => format!("[{encoded}] {role}"),
        None => role.clone(),
    };
    let text = if node.name.is_empty() {
        label
    } else {
        format!("{label}: {}", node.name)
    };

    out.push(OutlineLine {
        indent: depth,
        text,
        encoded,
        backend: node.backend,
    });

    // StaticText children whose combined text is exactly the accessible name
    // add nothing; a label split across several runs counts as one
    let static_text_combined: String = node
        .children
        .iter()
        .filter_map(|child| map.get(child))
        .filter(|child| child.role == "StaticText")
        .map(|child| child.name.as_str())
        .collect();
    let strip_static_text = !node.name.is_empty()
        && !static_text_combined.is_empty()
        && static_text_combined.trim() == node.name.trim();

    for child in &node.children {
        if strip_static_text {
            if let Some(child_node) = map.get(child) {
                if child_node.role == "StaticText" {
                    continue;
                }
            }
        }
        render_node(child, map, ctx, depth + 1, out);
    }
}

/// Everything captured for one frame before stitching
#[derive(Debug, Default)]
struct FrameCapture {
    ordinal: u32,
    url: Option<String>,
    /// backend id → xpath local to this frame's document
    paths: HashMap<i64, String>,
    outline: Vec<OutlineLine>,
    /// absolute xpath prefix assembled top-down through host iframes
    prefix: String,
    children: Vec<FrameId>,
}

async fn dom_index_for_session(
    inner: &Arc<PageInner>,
    session: Option<SessionId>,
) -> Result<DomIndex> {
    let mut params = GetDocumentParams::default();
    params.depth = Some(-1);
    params.pierce = Some(true);
    let root = inner.execute_on(params, session).await?.result.root;
    Ok(index_session_document(&root))
}

async fn ax_tree_for_frame(
    inner: &Arc<PageInner>,
    frame_id: &FrameId,
    session: Option<SessionId>,
    scoped: bool,
) -> Result<Vec<AxNode>> {
    if scoped {
        let params = GetFullAxTreeParams::builder()
            .frame_id(frame_id.clone())
            .build();
        match inner.execute_on(params, session.clone()).await {
            Ok(resp) => return Ok(resp.result.nodes),
            Err(err) => {
                // adoption races make the server reject the frame id; the
                // session-rooted tree still covers the frame
                tracing::debug!(frame = ?frame_id, "scoped AX tree failed: {err}");
            }
        }
    }
    let resp = inner
        .execute_on(GetFullAxTreeParams::default(), session)
        .await?;
    Ok(resp.result.nodes)
}

async fn capture_full(inner: &Arc<PageInner>) -> Result<HybridSnapshot> {
    let view = inner.tree_view().await?;
    let main_frame = view.main_frame.clone().ok_or(CdpError::NotFound)?;

    // one pierced DOM crawl per distinct session
    let mut indexes: HashMap<Option<String>, DomIndex> = HashMap::new();
    for frame in &view.frames {
        let key = frame.owner.as_ref().map(|s| s.inner().clone());
        if !indexes.contains_key(&key) {
            let index = dom_index_for_session(inner, frame.owner.clone()).await?;
            indexes.insert(key, index);
        }
    }

    let mut captures: HashMap<FrameId, FrameCapture> = HashMap::new();
    // host iframe backend id per frame, resolved in the parent's session
    let mut host_backend: HashMap<FrameId, i64> = HashMap::new();

    for frame in &view.frames {
        let owner_key = frame.owner.as_ref().map(|s| s.inner().clone());
        let index = indexes.get(&owner_key).expect("index exists for session");

        let parent_owner = frame
            .parent
            .as_ref()
            .and_then(|p| view.get(p))
            .and_then(|p| p.owner.clone());

        let doc_root = if frame.parent.is_none() {
            index.root_doc
        } else {
            // resolve the host element in the parent's session
            let owner = inner
                .execute_on(
                    GetFrameOwnerParams::new(frame.id.clone()),
                    parent_owner.clone(),
                )
                .await;
            match owner {
                Ok(owner) => {
                    let host = backend_i64(&owner.result.backend_node_id);
                    host_backend.insert(frame.id.clone(), host);
                    if parent_owner.as_ref().map(|s| s.inner())
                        == frame.owner.as_ref().map(|s| s.inner())
                    {
                        // same-session iframe: content document was crawled
                        // inline with the parent
                        match index.iframe_content.get(&host) {
                            Some(root) => *root,
                            None => index.root_doc,
                        }
                    } else {
                        // OOPIF: the child session's own top document
                        index.root_doc
                    }
                }
                Err(err) => {
                    tracing::debug!(frame = ?frame.id, "getFrameOwner failed: {err}");
                    index.root_doc
                }
            }
        };

        let paths = index.document_paths(doc_root);

        let ax_nodes = ax_tree_for_frame(inner, &frame.id, frame.owner.clone(), true).await?;
        let (roots, ax_map) = ax_lite_map(&ax_nodes);
        let ctx = OutlineContext {
            ordinal: frame.ordinal,
            tags: &index.tags,
            scrollable: &index.scrollable,
        };
        let outline = render_outline(&roots, &ax_map, &ctx);

        captures.insert(
            frame.id.clone(),
            FrameCapture {
                ordinal: frame.ordinal,
                url: frame.url.clone(),
                paths,
                outline,
                prefix: String::new(),
                children: frame.children.clone(),
            },
        );
    }

    // absolute prefixes, parents before children
    let mut queue = vec![main_frame.clone()];
    while let Some(frame_id) = queue.pop() {
        let (prefix, children) = {
            let capture = captures.get(&frame_id).expect("captured frame");
            (capture.prefix.clone(), capture.children.clone())
        };
        for child in children {
            let host_path = host_backend.get(&child).and_then(|host| {
                captures
                    .get(&frame_id)
                    .and_then(|c| c.paths.get(host).cloned())
            });
            if let Some(capture) = captures.get_mut(&child) {
                capture.prefix = match host_path {
                    Some(host_path) => format!("{prefix}{host_path}"),
                    None => prefix.clone(),
                };
            }
            queue.push(child);
        }
    }

    // merge maps
    let mut combined_xpath_map = HashMap::new();
    let mut combined_url_map = HashMap::new();
    for capture in captures.values() {
        for (backend, path) in &capture.paths {
            combined_xpath_map.insert(
                encode_id(capture.ordinal, *backend),
                format!("{}{}", capture.prefix, path),
            );
        }
        if let Some(url) = capture.url.as_ref() {
            for backend in capture.paths.keys() {
                combined_url_map.insert(encode_id(capture.ordinal, *backend), url.clone());
            }
        }
    }

    // inject child outlines beneath their host iframe's line
    let combined_tree = stitch_outlines(&main_frame, &captures, &host_backend);

    Ok(HybridSnapshot {
        combined_tree,
        combined_xpath_map,
        combined_url_map,
    })
}

fn stitch_outlines(
    main_frame: &FrameId,
    captures: &HashMap<FrameId, FrameCapture>,
    host_backend: &HashMap<FrameId, i64>,
) -> String {
    let mut rendered = String::new();
    render_frame_outline(main_frame, captures, host_backend, 0, &mut rendered);
    rendered
}

fn render_frame_outline(
    frame_id: &FrameId,
    captures: &HashMap<FrameId, FrameCapture>,
    host_backend: &HashMap<FrameId, i64>,
    indent_shift: usize,
    out: &mut String,
) {
    let Some(capture) = captures.get(frame_id) else {
        return;
    };

    // children keyed by the backend id of their host iframe in this frame
    let mut children_by_host: HashMap<i64, Vec<&FrameId>> = HashMap::new();
    let mut unanchored: Vec<&FrameId> = Vec::new();
    for child in &capture.children {
        match host_backend.get(child) {
            Some(host) => children_by_host.entry(*host).or_default().push(child),
            None => unanchored.push(child),
        }
    }

    for line in &capture.outline {
        let indent = indent_shift + line.indent;
        out.push_str(&"  ".repeat(indent));
        out.push_str(&line.text);
        out.push('\n');

        if let Some(children) = line.backend.and_then(|b| children_by_host.get(&b)) {
            for child in children {
                render_frame_outline(child, captures, host_backend, indent + 1, out);
            }
        }
    }

    // frames whose host never showed up in the outline still belong to the
    // snapshot, appended at this frame's level
    for child in unanchored {
        render_frame_outline(child, captures, host_backend, indent_shift + 1, out);
    }
}

/// The focus fast path: walk only the iframe chain the selector needs, map
/// only the target frame, and scope the outline to the focused subtree.
async fn capture_focused(inner: &Arc<PageInner>, selector: &str) -> Result<HybridSnapshot> {
    let locator = Locator::new(Arc::clone(inner), None, selector.to_string());
    let scope = locator.walk_to_tail().await?;
    let frame_hint = scope.frame_id.clone();
    if let Some(host) = scope.host {
        host.release().await;
    }

    let view = inner.tree_view().await?;
    let frame_id = match frame_hint {
        Some(id) => id,
        None => view.main_frame.clone().ok_or(CdpError::NotFound)?,
    };
    let frame = view.get(&frame_id).ok_or(CdpError::NotFound)?.clone();

    // the locator resolves the tail itself, shadow hops included
    let element = locator.resolve().await?;
    let focused_backend = backend_i64(&element.backend_node_id);
    element.release().await;

    let index = dom_index_for_session(inner, frame.owner.clone()).await?;

    // doc root: walk up one hop when this is a same-session iframe
    let parent_owner = frame
        .parent
        .as_ref()
        .and_then(|p| view.get(p))
        .and_then(|p| p.owner.clone());
    let doc_root = if frame.parent.is_none() {
        index.root_doc
    } else {
        match inner
            .execute_on(GetFrameOwnerParams::new(frame_id.clone()), parent_owner)
            .await
        {
            Ok(owner) => {
                let host = backend_i64(&owner.result.backend_node_id);
                index.iframe_content.get(&host).copied().unwrap_or(index.root_doc)
            }
            Err(_) => index.root_doc,
        }
    };
    let paths = index.document_paths(doc_root);

    // absolute prefix through the host chain, via the page-side helper
    let mut prefix = String::new();
    let mut cursor = frame.clone();
    while let Some(parent_id) = cursor.parent.clone() {
        let parent = view.get(&parent_id).ok_or(CdpError::NotFound)?.clone();
        let owner = inner
            .execute_on(
                GetFrameOwnerParams::new(cursor.id.clone()),
                parent.owner.clone(),
            )
            .await?;
        let host = Element::from_backend_id(
            Arc::clone(inner),
            owner.result.backend_node_id,
            parent.owner.clone(),
        )
        .await?;
        let host_path: Option<String> = host
            .call_js_fn(
                "function() {\
                   const h = window.__deepdriver__;\
                   return h ? h.xpathOfNode(this) : null;\
                 }",
                false,
            )
            .await
            .ok()
            .and_then(|r| r.result.value)
            .and_then(|v| v.as_str().map(str::to_string));
        host.release().await;
        prefix = format!("{}{}", host_path.unwrap_or_default(), prefix);
        cursor = parent;
    }

    let ax_nodes = ax_tree_for_frame(inner, &frame_id, frame.owner.clone(), true).await?;
    let (roots, ax_map) = ax_lite_map(&ax_nodes);

    // narrow to the subtree rooted at the focused node when it is present
    let focus_root: Option<String> = ax_map
        .iter()
        .find(|(_, node)| node.backend == Some(focused_backend))
        .map(|(id, _)| id.clone());
    let render_roots = match focus_root {
        Some(root) => vec![root],
        None => roots,
    };

    let ctx = OutlineContext {
        ordinal: frame.ordinal,
        tags: &index.tags,
        scrollable: &index.scrollable,
    };
    let outline = render_outline(&render_roots, &ax_map, &ctx);

    let mut combined_xpath_map = HashMap::new();
    let mut combined_url_map = HashMap::new();
    for (backend, path) in &paths {
        combined_xpath_map.insert(
            encode_id(frame.ordinal, *backend),
            format!("{prefix}{path}"),
        );
    }
    if let Some(url) = frame.url.as_ref() {
        for backend in paths.keys() {
            combined_url_map.insert(encode_id(frame.ordinal, *backend), url.clone());
        }
    }

    let mut combined_tree = String::new();
    for line in &outline {
        combined_tree.push_str(&"  ".repeat(line.indent));
        combined_tree.push_str(&line.text);
        combined_tree.push('\n');
    }

    Ok(HybridSnapshot {
        combined_tree,
        combined_xpath_map,
        combined_url_map,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn node(
        backend: i64,
        node_type: i64,
        name: &str,
        children: serde_json::Value,
    ) -> serde_json::Value {
        json!({
            "nodeId": backend,
            "backendNodeId": backend,
            "nodeType": node_type,
            "nodeName": name.to_uppercase(),
            "localName": if node_type == 1 { name.to_string() } else { String::new() },
            "nodeValue": "",
            "children": children,
        })
    }

    #[test]
    fn xpaths_qualify_sibling_groups() {
        let doc: Node = serde_json::from_value(node(
            1,
            9,
            "#document",
            json!([{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML",
                "localName": "html", "nodeValue": "",
                "children": [{
                    "nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "BODY",
                    "localName": "body", "nodeValue": "",
                    "children": [
                        node(4, 1, "div", json!([])),
                        node(5, 1, "div", json!([])),
                        node(6, 3, "#text", json!([])),
                        node(7, 1, "span", json!([])),
                    ],
                }],
            }]),
        ))
        .unwrap();

        let index = index_session_document(&doc);
        assert_eq!(index.paths[&4].1, "/html[1]/body[1]/div[1]");
        assert_eq!(index.paths[&5].1, "/html[1]/body[1]/div[2]");
        assert_eq!(index.paths[&6].1, "/html[1]/body[1]/text()[1]");
        assert_eq!(index.paths[&7].1, "/html[1]/body[1]/span[1]");
        assert_eq!(index.tags[&7], "span");
    }

    #[test]
    fn shadow_content_hangs_off_a_descendant_hop() {
        let doc: Node = serde_json::from_value(json!({
            "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "localName": "", "nodeValue": "",
            "children": [{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML",
                "localName": "html", "nodeValue": "",
                "children": [{
                    "nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "WIDGET-HOST",
                    "localName": "widget-host", "nodeValue": "",
                    "shadowRoots": [{
                        "nodeId": 4, "backendNodeId": 4, "nodeType": 11,
                        "nodeName": "#document-fragment", "localName": "", "nodeValue": "",
                        "children": [node(5, 1, "button", json!([]))],
                    }],
                }],
            }],
        }))
        .unwrap();

        let index = index_session_document(&doc);
        assert_eq!(index.paths[&5].1, "/html[1]/widget-host[1]//button[1]");
    }

    #[test]
    fn inline_content_documents_restart_their_paths() {
        let doc: Node = serde_json::from_value(json!({
            "nodeId": 1, "backendNodeId": 1, "nodeType": 9, "nodeName": "#document",
            "localName": "", "nodeValue": "",
            "children": [{
                "nodeId": 2, "backendNodeId": 2, "nodeType": 1, "nodeName": "HTML",
                "localName": "html", "nodeValue": "",
                "children": [{
                    "nodeId": 3, "backendNodeId": 3, "nodeType": 1, "nodeName": "IFRAME",
                    "localName": "iframe", "nodeValue": "",
                    "contentDocument": {
                        "nodeId": 10, "backendNodeId": 10, "nodeType": 9,
                        "nodeName": "#document", "localName": "", "nodeValue": "",
                        "children": [node(11, 1, "html", json!([node(12, 1, "body", json!([]))]))],
                    },
                }],
            }],
        }))
        .unwrap();

        let index = index_session_document(&doc);
        // the iframe element belongs to the outer document
        assert_eq!(index.paths[&3], (1, "/html[1]/iframe[1]".to_string()));
        // its content restarts at the content document root
        assert_eq!(index.iframe_content[&3], 10);
        assert_eq!(index.paths[&12], (10, "/html[1]/body[1]".to_string()));

        let outer = index.document_paths(1);
        assert!(outer.contains_key(&3));
        assert!(!outer.contains_key(&12));
    }

    fn ax_node(id: &str, role: &str, name: &str, backend: Option<i64>, children: Vec<&str>) -> AxNode {
        let mut value = json!({
            "nodeId": id,
            "ignored": false,
            "role": { "type": "role", "value": role },
            "name": { "type": "computedString", "value": name },
            "childIds": children,
        });
        if let Some(backend) = backend {
            value["backendDOMNodeId"] = json!(backend);
        }
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn outline_prunes_wrappers_and_decorates_roles() {
        let nodes = vec![
            ax_node("1", "RootWebArea", "Demo", Some(1), vec!["2"]),
            ax_node("2", "generic", "", Some(4), vec!["3"]),
            ax_node("3", "button", "Save", Some(5), vec!["4"]),
            ax_node("4", "StaticText", "Save", Some(6), vec![]),
        ];
        let (roots, map) = ax_lite_map(&nodes);
        assert_eq!(roots, vec!["1".to_string()]);

        let tags = HashMap::from([
            (4_i64, "div".to_string()),
            (5_i64, "button".to_string()),
        ]);
        let scrollable = std::collections::HashSet::new();
        let ctx = OutlineContext {
            ordinal: 0,
            tags: &tags,
            scrollable: &scrollable,
        };

        let lines = render_outline(&roots, &map, &ctx);
        let rendered: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();

        // the generic wrapper is hoisted away and the StaticText echo of the
        // button label is stripped
        assert_eq!(
            rendered,
            vec!["[0-1] RootWebArea: Demo", "[0-5] button: Save"]
        );
        assert_eq!(lines[1].indent, 1);
    }

    #[test]
    fn static_text_split_across_runs_is_stripped() {
        let nodes = vec![
            ax_node("1", "button", "Save Changes", Some(5), vec!["2", "3"]),
            ax_node("2", "StaticText", "Save", Some(6), vec![]),
            ax_node("3", "StaticText", " Changes", Some(7), vec![]),
        ];
        let (roots, map) = ax_lite_map(&nodes);
        let tags = HashMap::from([(5_i64, "button".to_string())]);
        let scrollable = std::collections::HashSet::new();
        let ctx = OutlineContext {
            ordinal: 0,
            tags: &tags,
            scrollable: &scrollable,
        };

        let lines = render_outline(&roots, &map, &ctx);
        let rendered: Vec<&str> = lines.iter().map(|l| l.text.as_str()).collect();
        // neither run alone equals the label, but together they do
        assert_eq!(rendered, vec!["[0-5] button: Save Changes"]);
    }

    #[test]
    fn partial_static_text_children_survive() {
        let nodes = vec![
            ax_node("1", "button", "Save Changes", Some(5), vec!["2"]),
            ax_node("2", "StaticText", "Save", Some(6), vec![]),
        ];
        let (roots, map) = ax_lite_map(&nodes);
        let tags = HashMap::from([(5_i64, "button".to_string())]);
        let scrollable = std::collections::HashSet::new();
        let ctx = OutlineContext {
            ordinal: 0,
            tags: &tags,
            scrollable: &scrollable,
        };

        let lines = render_outline(&roots, &map, &ctx);
        // "Save" is only part of the name, so the run is kept
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[1].text, "[0-6] StaticText: Save");
    }

    #[test]
    fn combobox_over_select_collapses() {
        let nodes = vec![ax_node("1", "combobox", "Country", Some(9), vec![])];
        let (roots, map) = ax_lite_map(&nodes);
        let tags = HashMap::from([(9_i64, "select".to_string())]);
        let scrollable = std::collections::HashSet::new();
        let ctx = OutlineContext {
            ordinal: 2,
            tags: &tags,
            scrollable: &scrollable,
        };
        let lines = render_outline(&roots, &map, &ctx);
        assert_eq!(lines[0].text, "[2-9] select: Country");
    }

    #[test]
    fn encoded_ids_join_ordinal_and_backend() {
        assert_eq!(encode_id(0, 42), "0-42");
        assert_eq!(encode_id(3, 7), "3-7");
    }
}
