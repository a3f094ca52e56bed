//! HTML reference rewriting.
//!
//! Works in two passes over a parsed document: first collect every `<img>`
//! that carries a `src` attribute, then (after the caller has allocated an
//! object id per reference) swap each `src` for the internal `/objects/<id>`
//! URL. An `onerror` handler restoring the original URL is written alongside,
//! so a browser that 404s on the internal URL falls back to the publisher.

use html5ever::{LocalName, QualName, ns};
// `ns!` expands to a use of `namespace_url!`; it has to be in scope.
use html5ever::namespace_url;
use ego_tree::NodeId;
use scraper::node::Node;
use scraper::{Html, Selector};
use std::sync::LazyLock;
use tendril::StrTendril;

static IMG_SELECTOR: LazyLock<Selector> = LazyLock::new(|| Selector::parse("img[src]").unwrap());

/// One `<img>` reference awaiting an object id.
#[derive(Debug, Clone)]
pub(crate) struct ImageRef {
    pub(crate) node: NodeId,
    pub(crate) src: String,
}

/// Collect every `<img src>` reference in document order.
pub(crate) fn collect_image_refs(doc: &Html) -> Vec<ImageRef> {
    doc.select(&IMG_SELECTOR)
        .filter_map(|el| {
            let src = el.value().attr("src")?;
            Some(ImageRef {
                node: el.id(),
                src: src.to_string(),
            })
        })
        .collect()
}

/// Point each collected reference at its allocated object id.
///
/// The original src goes into the `onerror` fallback verbatim, exactly as the
/// publisher served it.
pub(crate) fn apply_rewrites(doc: &mut Html, assigned: &[(ImageRef, i64)]) {
    for (image, object_id) in assigned {
        let Some(mut node) = doc.tree.get_mut(image.node) else {
            continue;
        };
        let Node::Element(element) = node.value() else {
            continue;
        };
        set_attr(element, "onerror", &format!("this.src='{}';this.onerror=''", image.src));
        set_attr(element, "src", &format!("/objects/{object_id}"));
    }
}

fn set_attr(element: &mut scraper::node::Element, name: &str, value: &str) {
    let name = QualName::new(None, ns!(), LocalName::from(name));
    element.attrs.insert(name, StrTendril::from(value));
}
