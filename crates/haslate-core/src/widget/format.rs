// ── Sensor value templates ──
//
// A small subset of Python-style format strings: `{v}` for the value,
// `{v:.Nf}` / `{v:0.Nf}` for a fixed number of decimals, `{u}` for the
// unit, and `{{` / `}}` for literal braces.

use std::fmt::Write as _;

/// Largest accepted `{v:.Nf}` precision.
const MAX_PRECISION: usize = 20;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Segment {
    Literal(String),
    Value { precision: Option<usize> },
    Unit,
}

/// A parsed value template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueTemplate {
    segments: Vec<Segment>,
}

impl ValueTemplate {
    pub fn parse(template: &str) -> Result<Self, String> {
        let mut segments = Vec::new();
        let mut literal = String::new();
        let mut chars = template.chars().peekable();

        while let Some(c) = chars.next() {
            match c {
                '{' if chars.peek() == Some(&'{') => {
                    chars.next();
                    literal.push('{');
                }
                '}' if chars.peek() == Some(&'}') => {
                    chars.next();
                    literal.push('}');
                }
                '{' => {
                    let mut field = String::new();
                    loop {
                        match chars.next() {
                            Some('}') => break,
                            Some(c) => field.push(c),
                            None => return Err(format!("unclosed placeholder in '{template}'")),
                        }
                    }
                    if !literal.is_empty() {
                        segments.push(Segment::Literal(std::mem::take(&mut literal)));
                    }
                    segments.push(parse_field(&field)?);
                }
                '}' => return Err(format!("single '}}' in '{template}'")),
                c => literal.push(c),
            }
        }
        if !literal.is_empty() {
            segments.push(Segment::Literal(literal));
        }
        Ok(Self { segments })
    }

    /// Substitute `value` and `unit`. Values that don't parse as numbers
    /// are inserted verbatim even where a precision is requested.
    pub fn render(&self, value: &str, unit: Option<&str>) -> String {
        let mut out = String::new();
        for segment in &self.segments {
            match segment {
                Segment::Literal(s) => out.push_str(s),
                Segment::Value { precision: None } => out.push_str(value),
                Segment::Value {
                    precision: Some(p),
                } => match value.trim().parse::<f64>() {
                    Ok(n) => {
                        let _ = write!(out, "{n:.p$}");
                    }
                    Err(_) => out.push_str(value),
                },
                Segment::Unit => out.push_str(unit.unwrap_or_default()),
            }
        }
        out.trim_end().to_owned()
    }
}

fn parse_field(field: &str) -> Result<Segment, String> {
    let (name, spec) = field.split_once(':').unwrap_or((field, ""));
    match (name, spec) {
        ("v", "") => Ok(Segment::Value { precision: None }),
        ("v", spec) => parse_precision(spec).map(|p| Segment::Value { precision: Some(p) }),
        ("u", "") => Ok(Segment::Unit),
        _ => Err(format!("unsupported placeholder '{{{field}}}'")),
    }
}

/// Accepts `.Nf` and `0.Nf` with `N <= MAX_PRECISION`.
fn parse_precision(spec: &str) -> Result<usize, String> {
    let digits = spec
        .strip_suffix('f')
        .and_then(|s| s.strip_prefix("0.").or_else(|| s.strip_prefix('.')))
        .ok_or_else(|| format!("unsupported format spec ':{spec}'"))?;
    let precision: usize = digits
        .parse()
        .map_err(|_| format!("unsupported format spec ':{spec}'"))?;
    if precision > MAX_PRECISION {
        return Err(format!(
            "precision {precision} in ':{spec}' exceeds {MAX_PRECISION}"
        ));
    }
    Ok(precision)
}
