// Companion tests for the visibility classifier

use std::sync::Arc;

use super::VisibilityClassifier;
use crate::config::VisibilityConfig;
use crate::dom::{
    AnimationStyle, ComputedStyle, DisplayStyle, DocumentView, IterationCount, NodeId, Rect,
    VisibilityStyle,
};
use crate::feed::{ChangeNotification, WatchedAttribute};
use crate::testing::FixtureDocument;

fn harness() -> (Arc<FixtureDocument>, VisibilityClassifier) {
    let doc = Arc::new(FixtureDocument::new());
    let classifier = VisibilityClassifier::new(
        Arc::clone(&doc) as Arc<dyn crate::dom::DocumentView>,
        VisibilityConfig::default(),
    );
    (doc, classifier)
}

// ---------------------------------------------------------------------------
// is_visible
// ---------------------------------------------------------------------------

#[test]
fn test_plain_element_is_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    assert!(classifier.is_visible(div));
}

#[test]
fn test_zero_size_element_is_not_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    doc.set_rect(div, Rect::new(50.0, 50.0, 50.0, 50.0));
    assert!(!classifier.is_visible(div));
}

#[test]
fn test_display_none_is_not_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    doc.set_style(
        div,
        ComputedStyle {
            display: DisplayStyle::None,
            ..ComputedStyle::default()
        },
    );
    assert!(!classifier.is_visible(div));
}

#[test]
fn test_hidden_visibility_and_zero_opacity_are_not_visible() {
    let (doc, classifier) = harness();
    let hidden = doc.add_element("div", None);
    doc.set_style(
        hidden,
        ComputedStyle {
            visibility: VisibilityStyle::Hidden,
            ..ComputedStyle::default()
        },
    );
    assert!(!classifier.is_visible(hidden));

    let transparent = doc.add_element("div", None);
    doc.set_style(
        transparent,
        ComputedStyle {
            opacity: 0.0,
            ..ComputedStyle::default()
        },
    );
    assert!(!classifier.is_visible(transparent));
}

#[test]
fn test_element_outside_viewport_is_not_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    doc.set_rect(div, Rect::new(2000.0, 2000.0, 2100.0, 2050.0));
    assert!(!classifier.is_visible(div));
}

#[test]
fn test_element_partially_in_viewport_is_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    doc.set_rect(div, Rect::new(-50.0, -50.0, 20.0, 20.0));
    assert!(classifier.is_visible(div));
}

#[test]
fn test_overlay_members_are_not_visible() {
    let (doc, classifier) = harness();

    let by_id = doc.add_element("div", None);
    doc.set_element_id(by_id, "paint-tracker-overlay");
    assert!(!classifier.is_visible(by_id));

    let inside = doc.add_element("span", Some(by_id));
    assert!(!classifier.is_visible(inside));

    let by_class = doc.add_element("div", None);
    doc.set_class(by_class, "pt-overlay-header compact");
    assert!(!classifier.is_visible(by_class));
}

#[test]
fn test_non_rendering_tags_are_not_visible() {
    let (doc, classifier) = harness();
    for tag in ["script", "style", "meta", "link", "noscript", "template", "head"] {
        let node = doc.add_element(tag, None);
        assert!(!classifier.is_visible(node), "{} should not be visible", tag);
    }
}

#[test]
fn test_clipped_by_overflow_hidden_ancestor() {
    let (doc, classifier) = harness();
    let clip = doc.add_element("div", None);
    doc.set_rect(clip, Rect::new(0.0, 0.0, 100.0, 100.0));
    doc.set_style(
        clip,
        ComputedStyle {
            overflow: crate::dom::OverflowStyle::Hidden,
            ..ComputedStyle::default()
        },
    );

    let child = doc.add_element("div", Some(clip));
    doc.set_rect(child, Rect::new(200.0, 200.0, 300.0, 250.0));
    assert!(!classifier.is_visible(child));

    // Overlapping the clip box keeps the child visible.
    doc.set_rect(child, Rect::new(80.0, 80.0, 300.0, 250.0));
    assert!(classifier.is_visible(child));
}

#[test]
fn test_text_node_is_not_visible_as_element() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    let text = doc.add_text("hello", div);
    assert!(!classifier.is_visible(text));
}

#[test]
fn test_inspection_failure_collapses_to_not_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    doc.poison(div);
    assert!(!classifier.is_visible(div));

    let detached = doc.add_element("div", None);
    doc.detach(detached);
    assert!(!classifier.is_visible(detached));
}

// ---------------------------------------------------------------------------
// is_ignored_subtree
// ---------------------------------------------------------------------------

#[test]
fn test_video_is_ignored() {
    let (doc, classifier) = harness();
    let video = doc.add_element("video", None);
    assert!(classifier.is_ignored_subtree(video));
}

#[test]
fn test_canvas_and_iframe_are_ignored() {
    let (doc, classifier) = harness();
    assert!(classifier.is_ignored_subtree(doc.add_element("canvas", None)));
    assert!(classifier.is_ignored_subtree(doc.add_element("iframe", None)));
}

#[test]
fn test_gif_image_is_ignored_but_static_image_is_not() {
    let (doc, classifier) = harness();

    let gif = doc.add_element("img", None);
    doc.set_attribute(gif, "src", "/media/loader.gif");
    assert!(classifier.is_ignored_subtree(gif));

    let gif_query = doc.add_element("img", None);
    doc.set_attribute(gif_query, "src", "/media/loader.gif?cache=1");
    assert!(classifier.is_ignored_subtree(gif_query));

    let png = doc.add_element("img", None);
    doc.set_attribute(png, "src", "/media/photo.png");
    assert!(!classifier.is_ignored_subtree(png));
}

#[test]
fn test_plain_div_is_not_ignored() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    assert!(!classifier.is_ignored_subtree(div));
}

#[test]
fn test_descendant_of_video_is_ignored() {
    let (doc, classifier) = harness();
    let video = doc.add_element("video", None);
    let track = doc.add_element("div", Some(video));
    assert!(classifier.is_ignored_subtree(track));
}

#[test]
fn test_animated_svg_is_ignored() {
    let (doc, classifier) = harness();
    let svg = doc.add_element("svg", None);
    doc.set_svg_animated(svg, true);
    assert!(classifier.is_ignored_subtree(svg));

    let still = doc.add_element("svg", None);
    assert!(!classifier.is_ignored_subtree(still));
}

#[test]
fn test_infinite_css_animation_is_ignored() {
    let (doc, classifier) = harness();
    let spinner = doc.add_element("div", None);
    doc.set_style(
        spinner,
        ComputedStyle {
            animation: Some(AnimationStyle {
                name: "spin".to_string(),
                iteration_count: IterationCount::Infinite,
            }),
            ..ComputedStyle::default()
        },
    );
    assert!(classifier.is_ignored_subtree(spinner));

    let bounded = doc.add_element("div", None);
    doc.set_style(
        bounded,
        ComputedStyle {
            animation: Some(AnimationStyle {
                name: "fade-in".to_string(),
                iteration_count: IterationCount::Finite(1.0),
            }),
            ..ComputedStyle::default()
        },
    );
    assert!(!classifier.is_ignored_subtree(bounded));
}

#[test]
fn test_carousel_container_does_not_hide_children() {
    let (doc, classifier) = harness();
    let carousel = doc.add_element("div", None);
    doc.set_class(carousel, "product-carousel");

    // The container itself is not ignorable by class alone...
    assert!(!classifier.is_ignored_subtree(carousel));

    // ...and neither are its plain children.
    let slide = doc.add_element("div", Some(carousel));
    assert!(!classifier.is_ignored_subtree(slide));

    // A media tag carrying the token is ignored outright.
    let img = doc.add_element("img", None);
    doc.set_class(img, "player-poster");
    doc.set_attribute(img, "src", "/media/poster.png");
    assert!(classifier.is_ignored_subtree(img));
}

#[test]
fn test_overlay_subtree_is_ignored() {
    let (doc, classifier) = harness();
    let overlay = doc.add_element("div", None);
    doc.set_element_id(overlay, "paint-tracker-overlay");
    let label = doc.add_element("span", Some(overlay));
    assert!(classifier.is_ignored_subtree(overlay));
    assert!(classifier.is_ignored_subtree(label));
}

#[test]
fn test_inspection_failure_collapses_to_ignored() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    doc.poison(div);
    assert!(classifier.is_ignored_subtree(div));
}

// ---------------------------------------------------------------------------
// is_visible_mutation
// ---------------------------------------------------------------------------

#[test]
fn test_added_visible_element_qualifies() {
    let (doc, classifier) = harness();
    let root = doc.root();
    let div = doc.add_element("div", None);

    let change = ChangeNotification::NodesAdded {
        target: root,
        added: vec![div],
    };
    assert!(classifier.is_visible_mutation(&change));
}

#[test]
fn test_added_hidden_element_does_not_qualify() {
    let (doc, classifier) = harness();
    let root = doc.root();
    let div = doc.add_element("div", None);
    doc.set_style(
        div,
        ComputedStyle {
            display: DisplayStyle::None,
            ..ComputedStyle::default()
        },
    );

    let change = ChangeNotification::NodesAdded {
        target: root,
        added: vec![div],
    };
    assert!(!classifier.is_visible_mutation(&change));
}

#[test]
fn test_added_text_qualifies_only_when_nonempty() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);

    let text = doc.add_text("fresh content", div);
    let change = ChangeNotification::NodesAdded {
        target: div,
        added: vec![text],
    };
    assert!(classifier.is_visible_mutation(&change));

    let blank = doc.add_text("   \n  ", div);
    let change = ChangeNotification::NodesAdded {
        target: div,
        added: vec![blank],
    };
    assert!(!classifier.is_visible_mutation(&change));
}

#[test]
fn test_removal_from_visible_target_qualifies() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);

    let change = ChangeNotification::NodesRemoved {
        target: div,
        removed: vec![NodeId(999)],
    };
    assert!(classifier.is_visible_mutation(&change));

    doc.set_style(
        div,
        ComputedStyle {
            display: DisplayStyle::None,
            ..ComputedStyle::default()
        },
    );
    let change = ChangeNotification::NodesRemoved {
        target: div,
        removed: vec![NodeId(999)],
    };
    assert!(!classifier.is_visible_mutation(&change));
}

#[test]
fn test_src_attribute_change_always_qualifies() {
    let (doc, classifier) = harness();
    let img = doc.add_element("img", None);
    // Even with the element currently hidden, geometry-affecting attributes
    // count unconditionally.
    doc.set_style(
        img,
        ComputedStyle {
            display: DisplayStyle::None,
            ..ComputedStyle::default()
        },
    );

    for attribute in [
        WatchedAttribute::Src,
        WatchedAttribute::Width,
        WatchedAttribute::Height,
    ] {
        let change = ChangeNotification::AttributeChanged {
            target: img,
            attribute,
        };
        assert!(classifier.is_visible_mutation(&change));
    }
}

#[test]
fn test_style_change_qualifies_only_while_visible() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);

    let change = ChangeNotification::AttributeChanged {
        target: div,
        attribute: WatchedAttribute::Style,
    };
    assert!(classifier.is_visible_mutation(&change));

    doc.set_style(
        div,
        ComputedStyle {
            display: DisplayStyle::None,
            ..ComputedStyle::default()
        },
    );
    assert!(!classifier.is_visible_mutation(&change));
}

#[test]
fn test_text_change_requires_visible_parent_and_content() {
    let (doc, classifier) = harness();
    let div = doc.add_element("div", None);
    let text = doc.add_text("updated", div);

    let change = ChangeNotification::TextChanged { target: text };
    assert!(classifier.is_visible_mutation(&change));

    doc.set_text(text, "   ");
    assert!(!classifier.is_visible_mutation(&change));

    doc.set_text(text, "back again");
    doc.set_style(
        div,
        ComputedStyle {
            display: DisplayStyle::None,
            ..ComputedStyle::default()
        },
    );
    assert!(!classifier.is_visible_mutation(&change));
}
