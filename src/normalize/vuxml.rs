use roxmltree::Node;

use crate::error::{ConvertError, Result};
use crate::model::{Operator, RangeSpec, VersionSpec};

use super::{RangeParser, SourceFormat};

/// Parses VuXML `<range>` elements.
///
/// Bounds are child elements: `<ge>`, `<gt>`, `<le>`, `<lt>` and `<eq>`.
/// Empty bounds and `*` mean unbounded.
#[derive(Debug, Clone, Copy, Default)]
pub struct VuxmlRangeParser;

impl<'a, 'input> RangeParser<Node<'a, 'input>> for VuxmlRangeParser {
    fn format(&self) -> SourceFormat {
        SourceFormat::Vuxml
    }

    fn parse(&self, input: &Node<'a, 'input>) -> Result<RangeSpec> {
        let source = &input.document().input_text()[input.range()];
        let mut specs = Vec::new();

        for bound in input.children().filter(Node::is_element) {
            let operator = match bound.tag_name().name() {
                "ge" => Operator::Ge,
                "gt" => Operator::Gt,
                "le" => Operator::Le,
                "lt" => Operator::Lt,
                "eq" => Operator::Eq,
                other => {
                    return Err(ConvertError::parse(
                        source,
                        format!("unexpected range element <{}>", other),
                    ))
                }
            };

            let version = bound.text().map(str::trim).unwrap_or_default();
            if version.is_empty() || version == "*" {
                continue;
            }
            specs.push(VersionSpec::new(operator, version));
        }

        RangeSpec::from_specs(specs, source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use roxmltree::Document;

    fn parse(xml: &str) -> Result<RangeSpec> {
        let doc = Document::parse(xml).unwrap();
        VuxmlRangeParser.parse(&doc.root_element())
    }

    #[test]
    fn test_parse_bounds() {
        let range = parse("<range><ge>1.0</ge><lt>2.0</lt></range>").unwrap();
        assert_eq!(range.lower(), Some(&VersionSpec::new(Operator::Ge, "1.0")));
        assert_eq!(range.upper(), Some(&VersionSpec::new(Operator::Lt, "2.0")));
    }

    #[test]
    fn test_parse_namespaced() {
        let range = parse(
            r#"<range xmlns="http://www.vuxml.org/apps/vuxml-1"><lt>3.1_2,1</lt></range>"#,
        )
        .unwrap();
        assert_eq!(range.upper(), Some(&VersionSpec::new(Operator::Lt, "3.1_2,1")));
        assert!(range.lower().is_none());
    }

    #[test]
    fn test_wildcard_and_empty_are_unbounded() {
        let range = parse("<range><ge>*</ge><lt></lt><le> </le></range>").unwrap();
        assert!(range.is_empty());
    }

    #[test]
    fn test_parse_eq() {
        let range = parse("<range><eq>1.4.2</eq></range>").unwrap();
        assert_eq!(range.exact(), Some(&VersionSpec::new(Operator::Eq, "1.4.2")));
    }

    #[test]
    fn test_eq_with_bound_is_structural() {
        let err = parse("<range><eq>1.0</eq><lt>2.0</lt></range>").unwrap_err();
        assert!(matches!(err, ConvertError::Structural(_)));
    }

    #[test]
    fn test_unknown_element() {
        let err = parse("<range><ne>1.0</ne></range>").unwrap_err();
        assert!(err.is_parse_error());
        assert!(err.to_string().contains("<ne>"));
    }
}
