//! Final output assembly
//!
//! Blocks are emitted in a fixed order regardless of which task finished
//! first: primary (or aggregator) result, optimized content, plot directive,
//! memory. Each non-empty block is wrapped in its configured tag.

use crate::core::string::same_text;
use crate::settings::OutputTags;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of auxiliary side-output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuxiliaryKind {
    Optimization,
    PlotDirective,
    Memory,
}

impl AuxiliaryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuxiliaryKind::Optimization => "optimization",
            AuxiliaryKind::PlotDirective => "plot_directive",
            AuxiliaryKind::Memory => "memory",
        }
    }

    /// Progress/cancellation id of the module.
    pub fn task_id(&self) -> String {
        format!("aux::{}", self.as_str())
    }

    fn tag<'a>(&self, tags: &'a OutputTags) -> &'a str {
        match self {
            AuxiliaryKind::Optimization => &tags.optimization,
            AuxiliaryKind::PlotDirective => &tags.plot_directive,
            AuxiliaryKind::Memory => &tags.memory,
        }
    }
}

impl fmt::Display for AuxiliaryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Contribution of one auxiliary module. Failed or cancelled modules
/// contribute empty text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuxiliaryResult {
    pub kind: AuxiliaryKind,
    pub text: String,
    /// Text the module was asked to work on; an output identical to it is a
    /// no-op signal.
    pub input: String,
}

impl AuxiliaryResult {
    pub fn new(kind: AuxiliaryKind, text: impl Into<String>, input: impl Into<String>) -> Self {
        Self {
            kind,
            text: text.into(),
            input: input.into(),
        }
    }

    pub fn empty(kind: AuxiliaryKind) -> Self {
        Self::new(kind, "", "")
    }

    pub fn is_empty(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Something the assembler left out, for the caller to log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AssemblyNote {
    /// The plot directive echoed its input verbatim and was dropped.
    EchoedPlotDirective,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Assembly {
    pub output: String,
    pub notes: Vec<AssemblyNote>,
}

/// Join labeled task results into one block, in the given order.
pub fn combine_labeled<'a, I>(parts: I) -> String
where
    I: IntoIterator<Item = (&'a str, &'a str)>,
{
    parts
        .into_iter()
        .filter(|(_, text)| !text.trim().is_empty())
        .map(|(label, text)| format!("[{}]\n{}", label, text.trim()))
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Deterministic merge of the primary block and auxiliary contributions.
pub struct ResultAssembler<'a> {
    tags: &'a OutputTags,
}

impl<'a> ResultAssembler<'a> {
    pub fn new(tags: &'a OutputTags) -> Self {
        Self { tags }
    }

    /// `primary` is the cabinet/fan-out result, or the aggregator result
    /// when that re-pass produced one.
    pub fn assemble(&self, primary: Option<&str>, auxiliary: &[AuxiliaryResult]) -> Assembly {
        let mut assembly = Assembly::default();
        let mut blocks = Vec::new();

        if let Some(primary) = primary.map(str::trim).filter(|p| !p.is_empty()) {
            blocks.push(wrap(&self.tags.primary, primary));
        }

        for kind in [
            AuxiliaryKind::Optimization,
            AuxiliaryKind::PlotDirective,
            AuxiliaryKind::Memory,
        ] {
            let Some(result) = auxiliary.iter().find(|r| r.kind == kind && !r.is_empty()) else {
                continue;
            };
            if kind == AuxiliaryKind::PlotDirective && same_text(&result.text, &result.input) {
                assembly.notes.push(AssemblyNote::EchoedPlotDirective);
                continue;
            }
            blocks.push(wrap(kind.tag(self.tags), result.text.trim()));
        }

        assembly.output = blocks.join("\n\n");
        assembly
    }
}

fn wrap(tag: &str, body: &str) -> String {
    format!("<{tag}>\n{body}\n</{tag}>")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_blocks_follow_fixed_order() {
        let tags = OutputTags::default();
        let aux = vec![
            AuxiliaryResult::new(AuxiliaryKind::Memory, "remembered", ""),
            AuxiliaryResult::new(AuxiliaryKind::PlotDirective, "go north", "hello"),
            AuxiliaryResult::new(AuxiliaryKind::Optimization, "better", "hello"),
        ];
        let assembly = ResultAssembler::new(&tags).assemble(Some("analysis"), &aux);
        assert_eq!(
            assembly.output,
            "<selective_analysis>\nanalysis\n</selective_analysis>\n\n\
             <optimized_content>\nbetter\n</optimized_content>\n\n\
             <plot_directive>\ngo north\n</plot_directive>\n\n\
             <memory>\nremembered\n</memory>"
        );
        assert!(assembly.notes.is_empty());
    }

    #[test]
    fn test_echoed_plot_directive_is_dropped() {
        let tags = OutputTags::default();
        let aux = vec![AuxiliaryResult::new(
            AuxiliaryKind::PlotDirective,
            " hello \n",
            "hello",
        )];
        let assembly = ResultAssembler::new(&tags).assemble(Some("p"), &aux);
        assert!(!assembly.output.contains("plot_directive"));
        assert_eq!(assembly.notes, vec![AssemblyNote::EchoedPlotDirective]);
    }

    #[test]
    fn test_empty_blocks_are_omitted() {
        let tags = OutputTags::default();
        let aux = vec![
            AuxiliaryResult::empty(AuxiliaryKind::Memory),
            AuxiliaryResult::new(AuxiliaryKind::Optimization, "opt", "in"),
        ];
        let assembly = ResultAssembler::new(&tags).assemble(None, &aux);
        assert_eq!(assembly.output, "<optimized_content>\nopt\n</optimized_content>");

        let nothing = ResultAssembler::new(&tags).assemble(Some("  "), &[]);
        assert_eq!(nothing.output, "");
    }

    #[test]
    fn test_custom_tags() {
        let tags = OutputTags {
            primary: "analysis".into(),
            ..OutputTags::default()
        };
        let assembly = ResultAssembler::new(&tags).assemble(Some("x"), &[]);
        assert_eq!(assembly.output, "<analysis>\nx\n</analysis>");
    }

    #[test]
    fn test_combine_labeled_skips_empty() {
        let combined = combine_labeled([("Alpha", "one"), ("Beta", " "), ("Gamma", "three\n")]);
        assert_eq!(combined, "[Alpha]\none\n\n[Gamma]\nthree");
    }
}
