//! Matching of features against layer rule trees.

use crate::style::context::FeatureContext;
use crate::style::rule::{DrawProperties, MatchedRule, RuleNode};

/// Matches a feature against a rule tree.
///
/// The tree is walked depth-first. A node whose filter is false is skipped together with all its
/// children. Every leaf reached produces one [`MatchedRule`] with the draw properties merged along
/// the path, in declaration order.
pub fn match_feature(context: &FeatureContext, root: &RuleNode) -> Vec<MatchedRule> {
    let mut matches = vec![];
    let mut path = vec![];
    visit(context, root, &DrawProperties::default(), &mut path, &mut matches);
    matches
}

fn visit(
    context: &FeatureContext,
    node: &RuleNode,
    inherited: &DrawProperties,
    path: &mut Vec<String>,
    matches: &mut Vec<MatchedRule>,
) {
    if let Some(filter) = &node.filter {
        if !filter.eval(context) {
            return;
        }
    }

    let draw = inherited.merge(&node.draw);
    path.push(node.name.clone());

    if node.is_leaf() {
        matches.push(MatchedRule {
            draw,
            path: path.clone(),
        });
    } else {
        for child in &node.children {
            visit(context, child, &draw, path, matches);
        }
    }

    path.pop();
}
