use std::rc::Rc;
use serde_json::json;
use crate::class::ClassDescriptor;
use crate::error::{Result, StateError};
use crate::value::{Container, Key, ObjectRef, TargetId, Value};

/// Marks an object encoding a `Map` as `[[key, value], ...]`.
pub const MAP_MARKER: &str = "__map__";
/// Marks an object encoding a `Set` as `[value, ...]`.
pub const SET_MARKER: &str = "__set__";
/// Marks an object encoding a `Date` as milliseconds since the epoch.
pub const DATE_MARKER: &str = "__date__";

/// JSON encoding of values, with tagged objects for maps, sets and dates.
///
/// Encoding an observed value reads it through its proxy, so whoever records while
/// encoding depends on everything encoded.
#[derive(Debug)]
pub struct JsonCoder;

/// The contents of a container, copied out so no borrow is held while recursing.
enum Shape {
    Object(Vec<(Rc<str>, Value)>),
    Array(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Set(Vec<Value>),
    Date(f64),
}

impl JsonCoder {
    pub fn stringify(value: &Value) -> Result<String> {
        let json = to_json(value, &mut Vec::new())?;
        Ok(serde_json::to_string(&json)?)
    }

    pub fn parse(text: &str) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        from_json(&json)
    }

    /// Parses an instance of `class`; the document must be a plain object.
    pub fn parse_to(text: &str, class: &Rc<ClassDescriptor>) -> Result<Value> {
        let json: serde_json::Value = serde_json::from_str(text)?;
        match &json {
            serde_json::Value::Object(fields) if !is_tagged(fields) => {
                let fields = fields.iter()
                    .map(|(k, v)| -> Result<(Rc<str>, Value)> { Ok((Rc::from(k.as_str()), from_json(v)?)) })
                    .collect::<Result<Vec<(Rc<str>, Value)>>>()?;
                Ok(Value::Ref(ObjectRef::new_instance(class, fields)))
            }
            other => Err(StateError::JsonTypeMismatch { expected: "object", found: json_type_name(other).to_string() }),
        }
    }
}

fn shape_of(value: &Value) -> Result<Option<Shape>> {
    Ok(Some(match value {
        Value::Observed(observed) => match observed.kind() {
            crate::value::ContainerKind::Object => {
                let mut fields = Vec::new();
                for key in observed.keys()? {
                    let value = observed.get(&key)?;
                    fields.push((key, value));
                }
                Shape::Object(fields)
            }
            crate::value::ContainerKind::Array => Shape::Array(observed.array()?.to_vec()?),
            crate::value::ContainerKind::Map => Shape::Map(observed.map()?.entries()?),
            crate::value::ContainerKind::Set => Shape::Set(observed.set_view()?.values()?),
            crate::value::ContainerKind::Date => Shape::Date(observed.date()?.get_time()?),
        },
        Value::Ref(target) => match &*target.borrow() {
            Container::Object(fields) => Shape::Object(fields.iter().map(|(k, v)| (k.clone(), v.clone())).collect()),
            Container::Array(items) => Shape::Array(items.clone()),
            Container::Map(entries) => Shape::Map(entries.iter().map(|(k, v)| (k.to_value(), v.clone())).collect()),
            Container::Set(values) => Shape::Set(values.iter().map(Key::to_value).collect()),
            Container::Date(ms) => Shape::Date(*ms),
        },
        _ => return Ok(None),
    }))
}

fn to_json(value: &Value, path: &mut Vec<TargetId>) -> Result<serde_json::Value> {
    let Some(target) = value.target() else {
        return Ok(primitive_to_json(value));
    };
    if path.contains(&target.id()) {
        return Err(StateError::CyclicValue);
    }
    path.push(target.id());
    let json = match shape_of(value)? {
        Some(Shape::Object(fields)) => {
            let mut object = serde_json::Map::new();
            for (key, value) in fields {
                // skipped like JSON.stringify does
                if matches!(value, Value::Undefined | Value::Function(_)) {
                    continue;
                }
                object.insert(key.to_string(), to_json(&value, path)?);
            }
            serde_json::Value::Object(object)
        }
        Some(Shape::Array(items)) => serde_json::Value::Array(items.iter().map(|v| to_json(v, path)).collect::<Result<_>>()?),
        Some(Shape::Map(entries)) => {
            let entries = entries.iter()
                .map(|(k, v)| -> Result<serde_json::Value> { Ok(json!([to_json(k, path)?, to_json(v, path)?])) })
                .collect::<Result<Vec<_>>>()?;
            json!({ MAP_MARKER: entries })
        }
        Some(Shape::Set(values)) => {
            let values = values.iter().map(|v| to_json(v, path)).collect::<Result<Vec<_>>>()?;
            json!({ SET_MARKER: values })
        }
        Some(Shape::Date(ms)) => json!({ DATE_MARKER: number_to_json(ms) }),
        None => serde_json::Value::Null,
    };
    path.pop();
    Ok(json)
}

fn primitive_to_json(value: &Value) -> serde_json::Value {
    match value {
        Value::Bool(b) => json!(b),
        Value::Number(n) => number_to_json(*n),
        Value::Str(s) => json!(&**s),
        _ => serde_json::Value::Null,
    }
}

/// Integral numbers print without a fraction; NaN and infinities become `null`.
fn number_to_json(n: f64) -> serde_json::Value {
    if n.fract() == 0.0 && n.abs() < MAX_SAFE_INTEGER {
        return json!(n as i64);
    }
    serde_json::Number::from_f64(n).map_or(serde_json::Value::Null, serde_json::Value::Number)
}

const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_992.0;

fn is_tagged(fields: &serde_json::Map<String, serde_json::Value>) -> bool {
    fields.len() == 1 && (fields.contains_key(MAP_MARKER) || fields.contains_key(SET_MARKER) || fields.contains_key(DATE_MARKER))
}

fn json_type_name(json: &serde_json::Value) -> &'static str {
    match json {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "boolean",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(fields) if fields.contains_key(MAP_MARKER) => "Map",
        serde_json::Value::Object(fields) if fields.contains_key(SET_MARKER) => "Set",
        serde_json::Value::Object(fields) if fields.contains_key(DATE_MARKER) => "Date",
        serde_json::Value::Object(_) => "object",
    }
}

fn from_json(json: &serde_json::Value) -> Result<Value> {
    Ok(match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(*b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::Str(Rc::from(s.as_str())),
        serde_json::Value::Array(items) => {
            let items = items.iter().map(from_json).collect::<Result<Vec<_>>>()?;
            Value::Ref(ObjectRef::new_array(items))
        }
        serde_json::Value::Object(fields) if is_tagged(fields) => tagged_from_json(fields)?,
        serde_json::Value::Object(fields) => {
            let fields = fields.iter()
                .map(|(k, v)| -> Result<(Rc<str>, Value)> { Ok((Rc::from(k.as_str()), from_json(v)?)) })
                .collect::<Result<Vec<(Rc<str>, Value)>>>()?;
            Value::Ref(ObjectRef::new_object(fields))
        }
    })
}

fn tagged_from_json(fields: &serde_json::Map<String, serde_json::Value>) -> Result<Value> {
    if let Some(entries) = fields.get(MAP_MARKER) {
        let serde_json::Value::Array(entries) = entries else {
            return Err(StateError::JsonTypeMismatch { expected: "array of [key, value]", found: json_type_name(entries).to_string() });
        };
        let mut map = Vec::with_capacity(entries.len());
        for entry in entries {
            match entry {
                serde_json::Value::Array(pair) if pair.len() == 2 => {
                    map.push((Key::from_value(&from_json(&pair[0])?)?, from_json(&pair[1])?));
                }
                other => return Err(StateError::JsonTypeMismatch { expected: "[key, value]", found: json_type_name(other).to_string() }),
            }
        }
        return Ok(Value::Ref(ObjectRef::new_map(map)));
    }
    if let Some(values) = fields.get(SET_MARKER) {
        let serde_json::Value::Array(values) = values else {
            return Err(StateError::JsonTypeMismatch { expected: "array", found: json_type_name(values).to_string() });
        };
        let values = values.iter()
            .map(|v| Key::from_value(&from_json(v)?))
            .collect::<Result<Vec<_>>>()?;
        return Ok(Value::Ref(ObjectRef::new_set(values)));
    }
    match fields.get(DATE_MARKER) {
        Some(serde_json::Value::Number(ms)) => Ok(Value::Ref(ObjectRef::new_date(ms.as_f64().unwrap_or(f64::NAN)))),
        Some(serde_json::Value::Null) => Ok(Value::Ref(ObjectRef::new_date(f64::NAN))),
        Some(other) => Err(StateError::JsonTypeMismatch { expected: "number", found: json_type_name(other).to_string() }),
        None => Err(StateError::JsonTypeMismatch { expected: "tagged object", found: "object".to_string() }),
    }
}
