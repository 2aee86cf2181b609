// Ordered rule table for the ignored-subtree walk
//
// Each rule inspects one node and either produces a verdict or abstains.
// Rules run top-down per node; the ancestor walk applies them to every node
// in the chain. Keeping them as named table entries keeps each heuristic
// testable without layout.

use crate::config::VisibilityConfig;
use crate::dom::{DocumentView, NodeId};

/// Outcome of one rule for one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RuleVerdict {
    /// The subtree is ignored outright.
    Ignore,
    /// Weak signal: this node is not ignorable by itself, and no further
    /// rules apply to it, but the ancestor walk continues.
    Continue,
}

pub(crate) struct RuleContext<'a> {
    pub view: &'a dyn DocumentView,
    pub config: &'a VisibilityConfig,
}

pub(crate) struct IgnoreRule {
    #[allow(dead_code)] // Names key the table for debugging and tests.
    pub name: &'static str,
    pub eval: fn(&RuleContext<'_>, NodeId) -> Option<RuleVerdict>,
}

/// Rules in evaluation order.
pub(crate) const IGNORE_RULES: &[IgnoreRule] = &[
    IgnoreRule {
        name: "overlay-member",
        eval: rule_overlay_member,
    },
    IgnoreRule {
        name: "embedded-media",
        eval: rule_embedded_media,
    },
    IgnoreRule {
        name: "animated-image",
        eval: rule_animated_image,
    },
    IgnoreRule {
        name: "animated-svg",
        eval: rule_animated_svg,
    },
    IgnoreRule {
        name: "looping-css-animation",
        eval: rule_looping_css_animation,
    },
    IgnoreRule {
        name: "media-container-token",
        eval: rule_media_container_token,
    },
];

fn rule_overlay_member(ctx: &RuleContext<'_>, node: NodeId) -> Option<RuleVerdict> {
    overlay_member(ctx, node).then_some(RuleVerdict::Ignore)
}

fn rule_embedded_media(ctx: &RuleContext<'_>, node: NodeId) -> Option<RuleVerdict> {
    let tag = ctx.view.tag_name(node)?;
    matches!(tag.as_str(), "video" | "canvas" | "iframe").then_some(RuleVerdict::Ignore)
}

fn rule_animated_image(ctx: &RuleContext<'_>, node: NodeId) -> Option<RuleVerdict> {
    let tag = ctx.view.tag_name(node)?;
    if tag != "img" {
        return None;
    }
    let src = ctx.view.attribute(node, "src").unwrap_or_default();
    has_gif_marker(&src).then_some(RuleVerdict::Ignore)
}

fn rule_animated_svg(ctx: &RuleContext<'_>, node: NodeId) -> Option<RuleVerdict> {
    let tag = ctx.view.tag_name(node)?;
    (tag == "svg" && ctx.view.contains_svg_animation(node)).then_some(RuleVerdict::Ignore)
}

fn rule_looping_css_animation(ctx: &RuleContext<'_>, node: NodeId) -> Option<RuleVerdict> {
    match ctx.view.computed_style(node) {
        Ok(style) => style
            .animation
            .as_ref()
            .is_some_and(|a| a.is_looping())
            .then_some(RuleVerdict::Ignore),
        // Style inspection failed mid-check; conservative verdict.
        Err(_) => Some(RuleVerdict::Ignore),
    }
}

fn rule_media_container_token(ctx: &RuleContext<'_>, node: NodeId) -> Option<RuleVerdict> {
    let class = ctx.view.class_name(node)?.to_lowercase();
    let matched = ctx
        .config
        .media_class_tokens
        .iter()
        .any(|token| class.contains(token.as_str()));
    if !matched {
        return None;
    }
    // A matching token only ignores the element when it is itself a media
    // tag. A matching container stays, and its children are still evaluated
    // independently.
    let tag = ctx.view.tag_name(node).unwrap_or_default();
    if tag == "video" || tag == "img" {
        Some(RuleVerdict::Ignore)
    } else {
        Some(RuleVerdict::Continue)
    }
}

/// True when the node's id or class marks it as part of the overlay.
pub(crate) fn overlay_member(ctx: &RuleContext<'_>, node: NodeId) -> bool {
    if let Some(id) = ctx.view.element_id(node) {
        if ctx.config.overlay_ids.iter().any(|known| *known == id) {
            return true;
        }
    }
    if let Some(class) = ctx.view.class_name(node) {
        if ctx
            .config
            .overlay_class_fragments
            .iter()
            .any(|fragment| class.contains(fragment.as_str()))
        {
            return true;
        }
    }
    false
}

/// GIF source detection: a path ending in `.gif` or carrying `.gif?`.
fn has_gif_marker(src: &str) -> bool {
    let lower = src.to_lowercase();
    lower.ends_with(".gif") || lower.contains(".gif?")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_gif_marker_variants() {
        assert!(has_gif_marker("/media/loader.gif"));
        assert!(has_gif_marker("https://cdn.example/loader.GIF"));
        assert!(has_gif_marker("/media/loader.gif?v=2"));
        assert!(!has_gif_marker("/media/photo.png"));
        assert!(!has_gif_marker("/media/gifts.png"));
    }

    #[test]
    fn test_rule_table_order() {
        let names: Vec<&str> = IGNORE_RULES.iter().map(|r| r.name).collect();
        assert_eq!(
            names,
            vec![
                "overlay-member",
                "embedded-media",
                "animated-image",
                "animated-svg",
                "looping-css-animation",
                "media-container-token",
            ]
        );
    }
}
