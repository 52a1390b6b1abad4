//! Rule condition language: parsing, validation and per-record evaluation
//!
//! Conditions are boolean expressions over the fields of one JSON record.
//!
//! # Syntax
//!
//! ```text
//! path <op> literal            Compare a field against a literal
//! path IS [NOT] NULL           Null / presence test
//! NOT expr                     Negate a sub-expression
//! expr AND expr, expr OR expr  Boolean combination (AND binds tighter)
//! ( expr )                     Grouping
//! ```
//!
//! Paths are dotted with optional array indices (`userIdentity.type`,
//! `resources[0].ARN`). String literals are single-quoted with `''` as the
//! escaped quote; numbers are bare decimals; `true`/`false` are accepted.
//! Keywords are case-insensitive.
//!
//! # Operators
//!
//! `=` `!=` `<>` `<` `<=` `>` `>=` `IN` `NOT IN` `CONTAINS` `NOT CONTAINS`
//! `STARTSWITH` `NOT STARTSWITH` `ENDSWITH` `NOT ENDSWITH` `MATCH` `LIKE`
//! `IS NULL` `IS NOT NULL`
//!
//! A field that does not resolve on a record satisfies no operator except
//! `IS NULL` — including the negated forms, so `field != 'x'` is `false`
//! on a record without the field.
//!
//! # Examples
//!
//! ```text
//! eventName = 'ConsoleLogin' AND responseElements.ConsoleLogin = 'Success'
//! errorCode IN ('AccessDenied', 'UnauthorizedOperation')
//! userAgent NOT CONTAINS 'aws-sdk' AND sourceIPAddress MATCH '203.0.*'
//! ```

pub mod error;
pub mod eval;
pub mod parser;
pub mod path;
pub mod validate;

pub use error::ConditionError;
pub use eval::eval;
pub use parser::{Expr, Literal, MAX_DEPTH, Predicate, Test, parse};
pub use path::{FieldPath, PathSegment};
pub use validate::{ValidationResult, validate};
