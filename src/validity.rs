// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

//! Consistency rules that run over the finished property tree.
//!
//! Every rule runs, even after another one failed, so a report lists all
//! problems at once. Rules can only affect the valid flag.

use log::debug;

use crate::engine::ParseState;
use crate::property::PropertyNode;
use crate::report::{Message, ParseResult, Severity};

/// One consistency rule: inspects the tree and state, appends findings.
pub(crate) type Rule = fn(&PropertyNode, &ParseState, &mut Findings);

#[derive(Default)]
pub(crate) struct Findings {
    messages: Vec<Message>,
}

impl Findings {
    pub(crate) fn invalid(&mut self, text: impl Into<String>) {
        self.push(Severity::Invalid, text.into(), None);
    }

    fn push(&mut self, severity: Severity, text: String, offset: Option<u64>) {
        self.messages.push(Message { severity, text, offset });
    }
}

/// Run every rule and fold the findings into `result`.
pub(crate) fn check(rules: &[Rule], result: &mut ParseResult) {
    let mut findings = Findings::default();
    for rule in rules {
        rule(result.properties(), result.state(), &mut findings);
    }
    debug!("{} rules, {} findings", rules.len(), findings.messages.len());
    for message in findings.messages {
        result.note(message);
    }
}

/// Number of top-level nodes called `name`.
pub(crate) fn count(tree: &PropertyNode, name: &str) -> usize {
    tree.children(name).count()
}

/// Position of the first top-level node called `name`.
pub(crate) fn first_index(tree: &PropertyNode, name: &str) -> Option<usize> {
    tree.entries().iter().position(|(n, _)| n == name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::Tristate;
    use crate::FormatKind;

    fn needs_a(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
        if count(tree, "a") == 0 {
            findings.invalid("no a");
        }
    }

    fn needs_b(tree: &PropertyNode, _: &ParseState, findings: &mut Findings) {
        if count(tree, "b") == 0 {
            findings.invalid("no b");
        }
    }

    #[test]
    fn all_rules_report() {
        let mut result = crate::report::Report::new().finish(FormatKind::Aiff, ParseState::default());
        check(&[needs_a, needs_b], &mut result);
        result.seal();
        assert_eq!(result.valid(), Tristate::False);
        assert_eq!(result.well_formed(), Tristate::True);
        assert_eq!(result.messages_of(Severity::Invalid).count(), 2);
    }
}
