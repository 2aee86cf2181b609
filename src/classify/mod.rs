// Visibility classifier - heuristic rules for "does the user see this?"
//
// This module decides whether a node, or a change notification about a node,
// can alter what the user sees. Two independent questions are answered:
//
// - is_ignored_subtree: is this node (or an ancestor) a source of perpetual
//   churn - the instrumentation overlay itself, embedded media, animated
//   images/SVG, or an infinitely looping CSS animation?
// - is_visible: is this node actually rendered on screen right now?
//
// Both are total and side-effect-free. Inspection failures (detached nodes,
// refused style queries) collapse to the conservative verdict: "ignored" for
// the subtree check, "not visible" for the visibility check. Verdicts are
// never memoized; geometry and style can change between calls.

use std::sync::Arc;

use crate::config::VisibilityConfig;
use crate::dom::{DocumentView, NodeId, NodeKind, OverflowStyle, Rect};
use crate::feed::{ChangeNotification, WatchedAttribute};

mod rules;

use rules::{RuleContext, RuleVerdict, IGNORE_RULES};

#[cfg(test)]
mod classify_tests;

/// Stateless predicate logic over the document view.
pub struct VisibilityClassifier {
    view: Arc<dyn DocumentView>,
    config: VisibilityConfig,
}

impl VisibilityClassifier {
    pub fn new(view: Arc<dyn DocumentView>, config: VisibilityConfig) -> Self {
        Self { view, config }
    }

    /// True when the node or any ancestor (bounded depth) belongs to a
    /// subtree whose changes never count as real visible content.
    ///
    /// Each node in the chain is run through the ordered rule table; the
    /// first `Ignore` verdict wins, a `Continue` verdict stops rule
    /// evaluation for that node but keeps walking ancestors.
    pub fn is_ignored_subtree(&self, node: NodeId) -> bool {
        let ctx = RuleContext {
            view: self.view.as_ref(),
            config: &self.config,
        };

        let mut current = Some(node);
        let mut depth = 0;
        while let Some(n) = current {
            if depth >= self.config.max_ancestor_depth {
                break;
            }
            for rule in IGNORE_RULES {
                match (rule.eval)(&ctx, n) {
                    Some(RuleVerdict::Ignore) => return true,
                    Some(RuleVerdict::Continue) => break,
                    None => {}
                }
            }
            current = self.view.parent(n);
            depth += 1;
        }
        false
    }

    /// True when the element is actually rendered on screen: an element,
    /// outside the overlay, with a rendering tag, a non-collapsed box, a
    /// non-hiding style, intersecting the viewport, and not clipped away by
    /// an overflow-hidden ancestor.
    pub fn is_visible(&self, node: NodeId) -> bool {
        if self.view.node_kind(node) != Some(NodeKind::Element) {
            return false;
        }
        if self.in_overlay(node) {
            return false;
        }

        let Some(tag) = self.view.tag_name(node) else {
            return false;
        };
        if self.config.hidden_tags.iter().any(|t| *t == tag) {
            return false;
        }

        let Ok(rect) = self.view.bounding_rect(node) else {
            return false;
        };
        let Ok(style) = self.view.computed_style(node) else {
            return false;
        };

        if rect.is_collapsed() {
            return false;
        }
        if style.hides_element() {
            return false;
        }
        if !rect.intersects(&self.view.viewport().as_rect()) {
            return false;
        }

        self.survives_ancestor_clip(node, &rect)
    }

    /// True when the change notification can alter what the user sees.
    pub fn is_visible_mutation(&self, change: &ChangeNotification) -> bool {
        match change {
            ChangeNotification::NodesAdded { added, .. } => {
                added.iter().any(|n| self.added_node_is_visible(*n))
            }
            // Removal of visible content is itself a visible change; the
            // removed nodes are gone, so the containing target stands in.
            ChangeNotification::NodesRemoved { target, .. } => self.is_visible(*target),
            ChangeNotification::AttributeChanged { target, attribute } => match attribute {
                WatchedAttribute::Src | WatchedAttribute::Width | WatchedAttribute::Height => true,
                WatchedAttribute::Style | WatchedAttribute::Class | WatchedAttribute::Display => {
                    self.is_visible(*target)
                }
            },
            ChangeNotification::TextChanged { target } => {
                let Some(parent) = self.view.parent(*target) else {
                    return false;
                };
                self.is_visible(parent) && self.text_is_nonempty(*target)
            }
        }
    }

    fn added_node_is_visible(&self, node: NodeId) -> bool {
        match self.view.node_kind(node) {
            Some(NodeKind::Element) => self.is_visible(node),
            Some(NodeKind::Text) => {
                let Some(parent) = self.view.parent(node) else {
                    return false;
                };
                self.is_visible(parent) && self.text_is_nonempty(node)
            }
            None => false,
        }
    }

    fn text_is_nonempty(&self, node: NodeId) -> bool {
        self.view
            .text_content(node)
            .map(|t| !t.trim().is_empty())
            .unwrap_or(false)
    }

    /// Walk the ancestor chain looking for overlay identifiers.
    fn in_overlay(&self, node: NodeId) -> bool {
        let ctx = RuleContext {
            view: self.view.as_ref(),
            config: &self.config,
        };
        let mut current = Some(node);
        let mut depth = 0;
        while let Some(n) = current {
            if depth >= self.config.max_ancestor_depth {
                break;
            }
            if rules::overlay_member(&ctx, n) {
                return true;
            }
            current = self.view.parent(n);
            depth += 1;
        }
        false
    }

    /// False when an overflow-clipping ancestor excludes the node's box
    /// entirely. Inspection failure along the chain collapses to clipped.
    fn survives_ancestor_clip(&self, node: NodeId, rect: &Rect) -> bool {
        let mut current = self.view.parent(node);
        let mut depth = 0;
        while let Some(ancestor) = current {
            if depth >= self.config.max_ancestor_depth {
                break;
            }
            match self.view.computed_style(ancestor) {
                Ok(style) if style.overflow == OverflowStyle::Hidden => {
                    match self.view.bounding_rect(ancestor) {
                        Ok(clip) => {
                            if !rect.intersects(&clip) {
                                return false;
                            }
                        }
                        Err(_) => return false,
                    }
                }
                Ok(_) => {}
                Err(_) => return false,
            }
            current = self.view.parent(ancestor);
            depth += 1;
        }
        true
    }
}
