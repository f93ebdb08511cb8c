//! The tagged RDF value type and its boolean coercion.

use std::cmp::Ordering;
use std::rc::Rc;

use crate::compare::CompareFlags;

/// A tagged RDF value. Copies are cheap: string payloads are `Rc<str>` so
/// cloning a literal never duplicates the underlying bytes.
///
/// Literals are immutable once constructed, matching the data model: a
/// row's slots are replaced wholesale (`set_value`/row refresh), never
/// mutated in place.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Blank(Rc<str>),
    Uri(Rc<str>),
    /// A plain or language/datatype-tagged string.
    String {
        value: Rc<str>,
        language: Option<Rc<str>>,
        datatype: Option<Rc<str>>,
    },
    /// A literal carrying an explicit, non-string datatype URI whose
    /// lexical form is opaque to this crate (arithmetic is not
    /// interpreted beyond the numeric/boolean/date kinds below).
    Typed { value: Rc<str>, datatype: Rc<str> },
    Integer(i64),
    /// Canonical lexical form of a decimal, e.g. `"3.140"`.
    Decimal(Rc<str>),
    Boolean(bool),
    Date(time::Date),
    /// A reference to a bound variable, used inside expression trees
    /// before evaluation resolves it to a concrete value.
    Variable(Rc<str>),
}

/// The distinct, non-boolean failure channel for expression evaluation.
///
/// Never conflate this with `false`: a filter must reject a row on
/// `TypeError` the same way it rejects one on a false boolean, but the two
/// are different outcomes and callers that need to tell them apart (for
/// diagnostics) can.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TypeError(pub String);

impl std::fmt::Display for TypeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "type error: {}", self.0)
    }
}

impl std::error::Error for TypeError {}

/// Result of coercing a literal to a boolean. `Unknown` must be treated as
/// neither true nor false by callers — in particular a filter still
/// rejects the row, but must not report that as "the expression was
/// false".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BoolCoercion {
    Known(bool),
    Unknown,
}

impl BoolCoercion {
    /// Collapse to a plain boolean the way filter contexts do: both
    /// `Known(false)` and `Unknown` reject.
    pub fn accepts(self) -> bool {
        matches!(self, BoolCoercion::Known(true))
    }
}

/// Coerces a literal to a boolean, represented as a two-variant
/// coercion result instead of a `(bool, error_flag)` out-parameter pair.
pub fn as_boolean(lit: &Literal) -> BoolCoercion {
    match lit {
        Literal::Boolean(b) => BoolCoercion::Known(*b),
        Literal::Integer(i) => BoolCoercion::Known(*i != 0),
        Literal::Decimal(s) => match s.parse::<f64>() {
            Ok(v) => BoolCoercion::Known(v != 0.0),
            Err(_) => BoolCoercion::Unknown,
        },
        Literal::String {
            value,
            language: None,
            datatype: None,
        } => BoolCoercion::Known(!value.is_empty()),
        Literal::String { .. }
        | Literal::Typed { .. }
        | Literal::Blank(_)
        | Literal::Uri(_)
        | Literal::Date(_)
        | Literal::Variable(_) => BoolCoercion::Unknown,
    }
}

fn type_rank(lit: &Literal) -> u8 {
    match lit {
        Literal::Blank(_) => 0,
        Literal::Uri(_) => 1,
        Literal::String { .. } => 2,
        Literal::Typed { .. } => 3,
        Literal::Boolean(_) => 4,
        Literal::Integer(_) => 5,
        Literal::Decimal(_) => 6,
        Literal::Date(_) => 7,
        Literal::Variable(_) => 8,
    }
}

/// Order two literals under the given comparison flags.
///
/// Same-kind literals compare by value (numeric for `Integer`/`Decimal`,
/// lexical otherwise, honoring `CompareFlags::is_caseless`); literals of
/// different kinds fall back to a fixed, deterministic type-rank order so
/// the sort row-source's comparator is always total.
pub fn compare(a: &Literal, b: &Literal, flags: CompareFlags) -> Ordering {
    use Literal::*;
    match (a, b) {
        (Integer(x), Integer(y)) => x.cmp(y),
        (Decimal(x), Decimal(y)) => {
            if flags.is_numeric() {
                match (x.parse::<f64>(), y.parse::<f64>()) {
                    (Ok(x), Ok(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
                    _ => x.cmp(y),
                }
            } else {
                x.cmp(y)
            }
        }
        (Integer(x), Decimal(y)) | (Decimal(y), Integer(x)) => {
            let x = *x as f64;
            let y: f64 = y.parse().unwrap_or(0.0);
            let ord = x.partial_cmp(&y).unwrap_or(Ordering::Equal);
            if matches!(a, Decimal(_)) { ord.reverse() } else { ord }
        }
        (Boolean(x), Boolean(y)) => x.cmp(y),
        (Date(x), Date(y)) => x.cmp(y),
        (Blank(x), Blank(y)) | (Uri(x), Uri(y)) | (Variable(x), Variable(y)) => {
            compare_str(x, y, flags)
        }
        (String { value: x, .. }, String { value: y, .. }) => compare_str(x, y, flags),
        (Typed { value: x, .. }, Typed { value: y, .. }) => compare_str(x, y, flags),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

fn compare_str(a: &str, b: &str, flags: CompareFlags) -> Ordering {
    if flags.is_caseless() {
        a.to_lowercase().cmp(&b.to_lowercase())
    } else {
        a.cmp(b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn boolean_coercion_of_numbers() {
        assert_eq!(as_boolean(&Literal::Integer(0)), BoolCoercion::Known(false));
        assert_eq!(as_boolean(&Literal::Integer(1)), BoolCoercion::Known(true));
    }

    #[test]
    fn boolean_coercion_of_bad_decimal_is_unknown() {
        assert_eq!(
            as_boolean(&Literal::Decimal("not-a-number".into())),
            BoolCoercion::Unknown
        );
    }

    #[test]
    fn unknown_never_accepts() {
        assert!(!BoolCoercion::Unknown.accepts());
        assert!(!BoolCoercion::Known(false).accepts());
        assert!(BoolCoercion::Known(true).accepts());
    }

    #[test]
    fn compare_integers_numerically() {
        assert_eq!(
            compare(&Literal::Integer(1), &Literal::Integer(2), CompareFlags::NONE),
            Ordering::Less
        );
    }

    #[test]
    fn compare_strings_caseless() {
        let flags = CompareFlags::NONE.with_caseless();
        let a = Literal::String {
            value: "ABC".into(),
            language: None,
            datatype: None,
        };
        let b = Literal::String {
            value: "abc".into(),
            language: None,
            datatype: None,
        };
        assert_eq!(compare(&a, &b, flags), Ordering::Equal);
    }

    #[test]
    fn compare_across_kinds_is_total_and_deterministic() {
        let a = Literal::Boolean(true);
        let b = Literal::Integer(0);
        assert_eq!(compare(&a, &b, CompareFlags::NONE), Ordering::Less);
        assert_eq!(compare(&b, &a, CompareFlags::NONE), Ordering::Greater);
    }
}
