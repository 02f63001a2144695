//! Text form of [`FieldSpec`].
//!
//! ```text
//! int | position | boolean | string | color
//! select <value>[:<Name>] ...
//! repeat <name> <type> [<name> <type> ...]
//! link <inner|source> <name> <type> [<name> <type> ...]
//! rely <source> <definition>
//! rely_value <source> <value> <definition>
//! ```
//!
//! Option names are percent-encoded, so `Relative Position` reads
//! `r:Relative%20Position`. Element types of `repeat` and `link` are limited
//! to the single-token scalar kinds. Rely definitions are any descriptor and
//! take the name of the rely field itself.

use std::fmt;

use super::schema::{FieldSpec, LinkSource, SelectOption};
use crate::{LightweaveError, Result};

impl FieldSpec {
    /// Parses a descriptor such as `repeat state int frame int` into a spec
    /// named `name`.
    pub fn parse(name: &str, descriptor: &str) -> Result<FieldSpec> {
        let tokens: Vec<&str> = descriptor.split_whitespace().collect();
        parse_tokens(name, &tokens, descriptor)
    }
}

fn parse_tokens(name: &str, tokens: &[&str], descriptor: &str) -> Result<FieldSpec> {
    let Some((&keyword, rest)) = tokens.split_first() else {
        return Err(LightweaveError::descriptor(descriptor, "empty descriptor"));
    };

    let scalar = |spec: FieldSpec| {
        if rest.is_empty() {
            Ok(spec)
        } else {
            Err(LightweaveError::descriptor(
                descriptor,
                format!("`{keyword}` takes no arguments"),
            ))
        }
    };

    match keyword {
        "int" => scalar(FieldSpec::int(name)),
        "position" => scalar(FieldSpec::position(name)),
        "boolean" => scalar(FieldSpec::boolean(name)),
        "string" => scalar(FieldSpec::text(name)),
        "color" => scalar(FieldSpec::color(name)),
        "select" => {
            if rest.is_empty() {
                return Err(LightweaveError::descriptor(
                    descriptor,
                    "select needs at least one option",
                ));
            }
            let options = rest
                .iter()
                .map(|token| -> Result<SelectOption> {
                    let Some((value, label)) = token.split_once(':') else {
                        return Ok(SelectOption::new(*token, *token));
                    };
                    let label = decode_label(label).ok_or_else(|| {
                        LightweaveError::descriptor(
                            descriptor,
                            format!("malformed option name `{label}`"),
                        )
                    })?;
                    Ok(SelectOption::new(label, value))
                })
                .collect::<Result<_>>()?;
            Ok(FieldSpec::Select {
                name: name.to_string(),
                options,
            })
        }
        "repeat" => Ok(FieldSpec::repeat(name, parse_pairs(rest, descriptor)?)),
        "link" => {
            let Some((&source, pairs)) = rest.split_first() else {
                return Err(LightweaveError::descriptor(descriptor, "link needs a source"));
            };
            let source = match source {
                "inner" => LinkSource::Inner,
                other => LinkSource::Field(other.to_string()),
            };
            Ok(FieldSpec::link(name, source, parse_pairs(pairs, descriptor)?))
        }
        "rely" => {
            let [source, definition @ ..] = rest else {
                return Err(LightweaveError::descriptor(descriptor, "rely needs a source"));
            };
            let inner = parse_tokens(name, definition, descriptor)?;
            Ok(FieldSpec::rely(name, *source, inner))
        }
        "rely_value" => {
            let [source, target, definition @ ..] = rest else {
                return Err(LightweaveError::descriptor(
                    descriptor,
                    "rely_value needs a source and a value",
                ));
            };
            let inner = parse_tokens(name, definition, descriptor)?;
            Ok(FieldSpec::rely_value(name, *source, *target, inner))
        }
        other => Err(LightweaveError::descriptor(
            descriptor,
            format!("unknown field type `{other}`"),
        )),
    }
}

fn parse_pairs(tokens: &[&str], descriptor: &str) -> Result<Vec<FieldSpec>> {
    if tokens.is_empty() || tokens.len() % 2 != 0 {
        return Err(LightweaveError::descriptor(
            descriptor,
            "expected one or more `<name> <type>` pairs",
        ));
    }

    tokens
        .chunks(2)
        .map(|pair| {
            let spec = parse_tokens(pair[0], &pair[1..], descriptor)?;
            if spec.is_basic() {
                Ok(spec)
            } else {
                Err(LightweaveError::descriptor(
                    descriptor,
                    format!("`{}` cannot be used as an element type", pair[1]),
                ))
            }
        })
        .collect()
}

impl fmt::Display for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Select { options, .. } => {
                f.write_str("select")?;
                for option in options {
                    if option.name == option.value {
                        write!(f, " {}", option.value)?;
                    } else {
                        write!(f, " {}:{}", option.value, encode_label(&option.name))?;
                    }
                }
                Ok(())
            }
            Self::Repeat { element, .. } => {
                f.write_str("repeat")?;
                write_pairs(f, element)
            }
            Self::Link {
                source, element, ..
            } => {
                match source {
                    LinkSource::Inner => f.write_str("link inner")?,
                    LinkSource::Field(name) => write!(f, "link {name}")?,
                }
                write_pairs(f, element)
            }
            Self::Rely { source, inner, .. } => write!(f, "rely {source} {inner}"),
            Self::RelyValue {
                source,
                target,
                inner,
                ..
            } => write!(f, "rely_value {source} {target} {inner}"),
            scalar => f.write_str(scalar.keyword()),
        }
    }
}

fn encode_label(label: &str) -> String {
    let mut encoded = String::with_capacity(label.len());
    for c in label.chars() {
        if c.is_whitespace() || c == '%' {
            let mut bytes = [0; 4];
            for byte in c.encode_utf8(&mut bytes).bytes() {
                encoded.push_str(&format!("%{byte:02X}"));
            }
        } else {
            encoded.push(c);
        }
    }
    encoded
}

/// Reverses [`encode_label`]; `None` on a broken escape.
fn decode_label(label: &str) -> Option<String> {
    let mut bytes = Vec::with_capacity(label.len());
    let mut rest = label.as_bytes();
    while let Some((&byte, tail)) = rest.split_first() {
        if byte == b'%' {
            let hex = std::str::from_utf8(tail.get(..2)?).ok()?;
            bytes.push(u8::from_str_radix(hex, 16).ok()?);
            rest = &tail[2..];
        } else {
            bytes.push(byte);
            rest = tail;
        }
    }
    String::from_utf8(bytes).ok()
}

fn write_pairs(f: &mut fmt::Formatter<'_>, element: &[FieldSpec]) -> fmt::Result {
    for spec in element {
        write!(f, " {} {}", spec.name(), spec)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_scalar_kinds() {
        assert_eq!(FieldSpec::parse("d", "int").unwrap(), FieldSpec::int("d"));
        assert_eq!(
            FieldSpec::parse("p", "position").unwrap(),
            FieldSpec::position("p")
        );
        assert_eq!(FieldSpec::parse("c", " color ").unwrap(), FieldSpec::color("c"));
    }

    #[test]
    fn parses_select_with_labels() {
        let spec = FieldSpec::parse("defineBy", "select l:Length c:Colors").unwrap();
        assert_eq!(
            spec,
            FieldSpec::select("defineBy", &[("Length", "l"), ("Colors", "c")])
        );
        assert_eq!(spec.to_string(), "select l:Length c:Colors");
    }

    #[test]
    fn parses_repeat_and_link_pairs() {
        let repeat = FieldSpec::parse("transitions", "repeat state int frame int").unwrap();
        assert_eq!(
            repeat,
            FieldSpec::repeat(
                "transitions",
                vec![FieldSpec::int("state"), FieldSpec::int("frame")]
            )
        );

        let link = FieldSpec::parse("states", "link inner state int animation int").unwrap();
        assert_eq!(link.to_string(), "link inner state int animation int");
        assert_eq!(link.dependency(), None);

        let named = FieldSpec::parse("copies", "link transitions offset int").unwrap();
        assert_eq!(named.dependency(), Some("transitions"));
    }

    #[test]
    fn parses_nested_rely_definitions() {
        let spec = FieldSpec::parse("colors", "rely_value defineBy c repeat color color").unwrap();
        assert_eq!(
            spec,
            FieldSpec::rely_value(
                "colors",
                "defineBy",
                "c",
                FieldSpec::repeat("colors", vec![FieldSpec::color("color")])
            )
        );

        let rely = FieldSpec::parse("offset", "rely enabled int").unwrap();
        assert_eq!(rely.dependency(), Some("enabled"));
        assert_eq!(rely.wrapped(), Some(&FieldSpec::int("offset")));
    }

    #[test]
    fn option_names_with_spaces_survive_printing() {
        let spec = FieldSpec::select("bind", &[("Relative Position", "r"), ("100% Fixed", "f")]);
        let descriptor = spec.to_string();
        assert_eq!(descriptor, "select r:Relative%20Position f:100%25%20Fixed");
        assert_eq!(FieldSpec::parse("bind", &descriptor).unwrap(), spec);
    }

    #[test]
    fn rejects_malformed_descriptors() {
        for descriptor in [
            "",
            "float",
            "int 3",
            "select",
            "repeat state",
            "repeat list repeat",
            "link",
            "rely",
            "rely_value source",
            "select r:Broken%2",
            "select r:Broken%zz",
        ] {
            let err = FieldSpec::parse("x", descriptor).unwrap_err();
            assert!(
                matches!(err, LightweaveError::Descriptor { .. }),
                "`{descriptor}` gave {err}"
            );
        }
    }
}
