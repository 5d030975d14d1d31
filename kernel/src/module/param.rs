//! Module parameters.
//!
//! C header: [`include/linux/moduleparam.h`](../../../include/linux/moduleparam.h)

use std::collections::BTreeMap;

use crate::{code::*, error::KernelResult as Result};

/// A parsed parameter value.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ParamValue {
    Bool(bool),
    I32(i32),
    U32(u32),
    U64(u64),
    Str(String),
}

impl core::fmt::Display for ParamValue {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        match self {
            ParamValue::Bool(v) => f.write_str(if *v { "Y" } else { "N" }),
            ParamValue::I32(v) => write!(f, "{}", v),
            ParamValue::U32(v) => write!(f, "{}", v),
            ParamValue::U64(v) => write!(f, "{}", v),
            ParamValue::Str(v) => f.write_str(v),
        }
    }
}

/// Types that can be used for module parameters.
pub trait ModuleParam: Sized {
    /// Parses a parameter argument into the parameter value.
    ///
    /// `arg == None` indicates the parameter was given without a value (`insmod m flag`),
    /// which only boolean parameters accept.
    fn try_from_param_arg(arg: Option<&str>) -> Result<Self>;

    fn into_value(self) -> ParamValue;

    fn from_value(value: &ParamValue) -> Option<Self>;
}

/// Splits an integer argument into sign, radix and digits like `kstrtol` with base 0.
///
/// At most one sign is accepted, and only in front of the radix prefix.
fn split_radix(arg: &str) -> Result<(bool, u32, &str)> {
    let (negative, rest) = match arg.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, arg.strip_prefix('+').unwrap_or(arg)),
    };
    let (radix, digits) =
        if let Some(hex) = rest.strip_prefix("0x").or_else(|| rest.strip_prefix("0X")) {
            (16, hex)
        } else if rest.len() > 1 && rest.starts_with('0') {
            (8, &rest[1..])
        } else {
            (10, rest)
        };
    if digits.starts_with(['+', '-']) {
        return Err(EINVAL);
    }
    Ok((negative, radix, digits))
}

fn parse_unsigned(arg: Option<&str>) -> Result<u64> {
    let (negative, radix, digits) = split_radix(arg.ok_or(EINVAL)?)?;
    if negative {
        return Err(EINVAL);
    }
    Ok(u64::from_str_radix(digits, radix)?)
}

impl ModuleParam for bool {
    fn try_from_param_arg(arg: Option<&str>) -> Result<Self> {
        match arg {
            None => Ok(true),
            Some("y") | Some("Y") | Some("1") | Some("true") => Ok(true),
            Some("n") | Some("N") | Some("0") | Some("false") => Ok(false),
            _ => Err(EINVAL),
        }
    }

    fn into_value(self) -> ParamValue {
        ParamValue::Bool(self)
    }

    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Bool(v) => Some(*v),
            _ => None,
        }
    }
}

impl ModuleParam for i32 {
    fn try_from_param_arg(arg: Option<&str>) -> Result<Self> {
        let (negative, radix, digits) = split_radix(arg.ok_or(EINVAL)?)?;
        let magnitude = i64::from_str_radix(digits, radix)?;
        let value = if negative { -magnitude } else { magnitude };
        Ok(i32::try_from(value)?)
    }

    fn into_value(self) -> ParamValue {
        ParamValue::I32(self)
    }

    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::I32(v) => Some(*v),
            _ => None,
        }
    }
}

impl ModuleParam for u32 {
    fn try_from_param_arg(arg: Option<&str>) -> Result<Self> {
        Ok(u32::try_from(parse_unsigned(arg)?)?)
    }

    fn into_value(self) -> ParamValue {
        ParamValue::U32(self)
    }

    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::U32(v) => Some(*v),
            _ => None,
        }
    }
}

impl ModuleParam for u64 {
    fn try_from_param_arg(arg: Option<&str>) -> Result<Self> {
        parse_unsigned(arg)
    }

    fn into_value(self) -> ParamValue {
        ParamValue::U64(self)
    }

    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::U64(v) => Some(*v),
            _ => None,
        }
    }
}

/// A `charp` parameter.
impl ModuleParam for String {
    fn try_from_param_arg(arg: Option<&str>) -> Result<Self> {
        arg.map(String::from).ok_or(EINVAL)
    }

    fn into_value(self) -> ParamValue {
        ParamValue::Str(self)
    }

    fn from_value(value: &ParamValue) -> Option<Self> {
        match value {
            ParamValue::Str(v) => Some(v.clone()),
            _ => None,
        }
    }
}

/// Declaration of one parameter, as generated by [`module!`](crate::module!).
pub struct ParamSpec {
    pub name: &'static str,
    pub description: &'static str,
    /// `sysfs` permissions; zero hides the parameter.
    pub permissions: u16,
    pub default: fn() -> ParamValue,
    pub parse: fn(Option<&str>) -> Result<ParamValue>,
}

/// Splits an `insmod` argument string into `(name, value)` pairs.
///
/// Values may be double-quoted to contain spaces, as in `device_name="my dev"`.
fn next_args(args: &str) -> Result<Vec<(String, Option<String>)>> {
    let mut out = Vec::new();
    let mut chars = args.chars().peekable();
    loop {
        while chars.next_if(|c| c.is_whitespace()).is_some() {}
        if chars.peek().is_none() {
            return Ok(out);
        }
        let mut token = String::new();
        let mut in_quote = false;
        let mut has_equals = false;
        let mut value = String::new();
        while let Some(&c) = chars.peek() {
            if c.is_whitespace() && !in_quote {
                break;
            }
            chars.next();
            match c {
                '"' => in_quote = !in_quote,
                '=' if !has_equals && !in_quote => has_equals = true,
                c if has_equals => value.push(c),
                c => token.push(c),
            }
        }
        if in_quote || token.is_empty() {
            return Err(EINVAL);
        }
        out.push((token, has_equals.then_some(value)));
    }
}

/// The parameter values of one loaded module.
#[derive(Clone, Debug, Default)]
pub struct ParamStore {
    values: BTreeMap<&'static str, ParamValue>,
    visible: Vec<&'static str>,
}

impl ParamStore {
    /// Starts from each parameter's default and applies `args`.
    ///
    /// Unknown names fail with `ENOENT`, values that do not parse as the parameter's type
    /// with `EINVAL`. Dashes and underscores in names are interchangeable.
    pub fn parse(specs: &[ParamSpec], args: &str) -> Result<ParamStore> {
        let mut store = ParamStore::default();
        for spec in specs {
            store.values.insert(spec.name, (spec.default)());
            if spec.permissions != 0 {
                store.visible.push(spec.name);
            }
        }
        for (name, value) in next_args(args)? {
            let name = name.replace('-', "_");
            let Some(spec) = specs.iter().find(|s| s.name == name) else {
                log::warn!("unknown parameter '{}'", name);
                return Err(ENOENT);
            };
            match (spec.parse)(value.as_deref()) {
                Ok(v) => {
                    store.values.insert(spec.name, v);
                }
                Err(e) => {
                    log::warn!(
                        "'{}' invalid for parameter '{}'",
                        value.unwrap_or_default(),
                        name
                    );
                    return Err(e);
                }
            }
        }
        Ok(store)
    }

    /// Returns the value of parameter `name`.
    ///
    /// Fails with `ENOENT` for an undeclared name and `EINVAL` when `T` is not the
    /// declared type.
    pub fn get<T: ModuleParam>(&self, name: &str) -> Result<T> {
        let value = self.values.get(name).ok_or(ENOENT)?;
        T::from_value(value).ok_or(EINVAL)
    }

    /// `(name, value)` of each parameter with non-zero permissions, as
    /// `/sys/module/<name>/parameters` lists them.
    pub fn visible(&self) -> Vec<(&'static str, String)> {
        self.visible
            .iter()
            .filter_map(|name| self.values.get(name).map(|v| (*name, v.to_string())))
            .collect()
    }
}
