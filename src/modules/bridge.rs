//! Conversion between interpreter values and native `serde_json` values

use mlua::{Lua, MultiValue, Table, Value as LuaValue};
use serde_json::{Map, Number, Value};

use super::args::BoundArgs;
use super::descriptor::{ArgType, Descriptor, ParamSpec, Presence};
use super::error::{BindError, ConvertError};
use super::interface::OpResult;

const MAX_DEPTH: usize = 64;

/// Convert a Lua value into JSON. Sequences become arrays, any other table
/// becomes an object; an empty table becomes an empty object.
pub fn lua_to_json(value: &LuaValue) -> Result<Value, ConvertError> {
    to_json(value, 0)
}

fn to_json(value: &LuaValue, depth: usize) -> Result<Value, ConvertError> {
    match value {
        LuaValue::Nil => Ok(Value::Null),
        LuaValue::Boolean(b) => Ok(Value::Bool(*b)),
        LuaValue::Integer(i) => Ok(Value::from(*i)),
        LuaValue::Number(n) => Number::from_f64(*n)
            .map(Value::Number)
            .ok_or(ConvertError::NonFinite(*n)),
        LuaValue::String(s) => Ok(Value::String(s.to_string_lossy())),
        LuaValue::Table(t) => table_to_json(t, depth + 1),
        other => Err(ConvertError::Unsupported(other.type_name())),
    }
}

fn table_to_json(table: &Table, depth: usize) -> Result<Value, ConvertError> {
    if depth > MAX_DEPTH {
        return Err(ConvertError::TooDeep(MAX_DEPTH));
    }

    let mut pairs = Vec::new();
    for pair in table.pairs::<LuaValue, LuaValue>() {
        pairs.push(pair.map_err(|e| ConvertError::Lua(e.to_string()))?);
    }

    let len = table.raw_len();
    if len > 0 && pairs.len() == len {
        let mut items = Vec::with_capacity(len);
        for i in 1..=len {
            let item: LuaValue = table
                .raw_get(i)
                .map_err(|e| ConvertError::Lua(e.to_string()))?;
            items.push(to_json(&item, depth)?);
        }
        return Ok(Value::Array(items));
    }

    let mut map = Map::new();
    for (key, item) in pairs {
        let key = match key {
            LuaValue::String(s) => s.to_string_lossy(),
            LuaValue::Integer(i) => i.to_string(),
            LuaValue::Number(n) => n.to_string(),
            other => return Err(ConvertError::BadKey(other.type_name())),
        };
        map.insert(key, to_json(&item, depth)?);
    }
    Ok(Value::Object(map))
}

/// Convert JSON into a Lua value. `null` becomes `nil`.
pub fn json_to_lua(lua: &Lua, value: &Value) -> mlua::Result<LuaValue> {
    Ok(match value {
        Value::Null => LuaValue::Nil,
        Value::Bool(b) => LuaValue::Boolean(*b),
        Value::Number(n) => match n.as_i64() {
            Some(i) => LuaValue::Integer(i),
            None => LuaValue::Number(n.as_f64().unwrap_or_default()),
        },
        Value::String(s) => LuaValue::String(lua.create_string(s)?),
        Value::Array(items) => {
            let table = lua.create_table_with_capacity(items.len(), 0)?;
            for (i, item) in items.iter().enumerate() {
                table.raw_set(i + 1, json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
        Value::Object(map) => {
            let table = lua.create_table_with_capacity(0, map.len())?;
            for (key, item) in map {
                table.raw_set(key.as_str(), json_to_lua(lua, item)?)?;
            }
            LuaValue::Table(table)
        }
    })
}

/// Build the record scripts receive from an operation call.
pub fn result_to_lua(lua: &Lua, result: &OpResult) -> mlua::Result<LuaValue> {
    let value = serde_json::to_value(result).map_err(mlua::Error::external)?;
    json_to_lua(lua, &value)
}

/// A trailing table is treated as keyword arguments when it has no array
/// part and only string keys.
fn is_keyword_table(table: &Table) -> bool {
    table.raw_len() == 0
        && table
            .pairs::<LuaValue, LuaValue>()
            .all(|pair| matches!(pair, Ok((LuaValue::String(_), _))))
}

/// Bind call arguments against `descriptor`. Leading values bind
/// positionally in descriptor order; a trailing keyword table binds by name.
pub fn bind(descriptor: &Descriptor, args: MultiValue) -> Result<BoundArgs, BindError> {
    let kind = descriptor.kind();
    let mut positional: Vec<LuaValue> = args.into_iter().collect();
    let keywords = match positional.last() {
        Some(LuaValue::Table(t)) if is_keyword_table(t) => {
            let t = t.clone();
            positional.pop();
            Some(t)
        }
        _ => None,
    };

    let params = descriptor.params();
    if positional.len() > params.len() {
        return Err(BindError::TooMany {
            kind: kind.to_string(),
            given: positional.len(),
            max: params.len(),
        });
    }

    let mut bound = BoundArgs::new(kind);
    for (spec, value) in params.iter().zip(positional.iter()) {
        bind_one(&mut bound, kind, spec, value)?;
    }

    if let Some(keywords) = keywords {
        for pair in keywords.pairs::<mlua::String, LuaValue>() {
            let (key, value) = pair.map_err(|e| BindError::Convert {
                kind: kind.to_string(),
                key: "<keywords>".to_string(),
                message: e.to_string(),
            })?;
            let key = key.to_string_lossy();
            let spec = descriptor
                .param(&key)
                .ok_or_else(|| BindError::Unexpected {
                    kind: kind.to_string(),
                    key: key.clone(),
                })?;
            if bound.contains(spec.key) {
                return Err(BindError::Duplicate {
                    kind: kind.to_string(),
                    key,
                });
            }
            bind_one(&mut bound, kind, spec, &value)?;
        }
    }

    if let Some(missing) = params
        .iter()
        .find(|p| p.is_required() && !bound.contains(p.key))
    {
        return Err(BindError::Missing {
            kind: kind.to_string(),
            key: missing.key.to_string(),
        });
    }

    Ok(bound)
}

fn bind_one(
    bound: &mut BoundArgs,
    kind: &str,
    spec: &ParamSpec,
    value: &LuaValue,
) -> Result<(), BindError> {
    let type_error = |got: &str| BindError::Type {
        kind: kind.to_string(),
        key: spec.key.to_string(),
        got: got.to_string(),
        want: spec.ty.name(),
    };

    if value.is_nil() {
        return match spec.presence {
            Presence::OptionalNilAbsent => Ok(()),
            _ => Err(type_error("nil")),
        };
    }

    let converted = lua_to_json(value).map_err(|e| BindError::Convert {
        kind: kind.to_string(),
        key: spec.key.to_string(),
        message: e.to_string(),
    })?;

    let checked = match (spec.ty, value, converted) {
        (ArgType::Any, _, v) => v,
        (ArgType::Str, LuaValue::String(_), v) => v,
        (ArgType::Bool, LuaValue::Boolean(_), v) => v,
        (ArgType::Int, LuaValue::Integer(_), v) => v,
        (ArgType::Int, LuaValue::Number(n), _)
            if n.fract() == 0.0 && *n >= i64::MIN as f64 && *n <= i64::MAX as f64 =>
        {
            Value::from(*n as i64)
        }
        (ArgType::List, _, v @ Value::Array(_)) => v,
        (ArgType::List, _, Value::Object(m)) if m.is_empty() => Value::Array(Vec::new()),
        (ArgType::Dict, _, v @ Value::Object(_)) => v,
        (_, other, _) => return Err(type_error(other.type_name())),
    };

    bound.insert(spec.key, checked);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn write_descriptor() -> Descriptor {
        Descriptor::new("write", &[("str", ArgType::Str), ("end??", ArgType::Str)])
    }

    fn call(lua: &Lua, descriptor: &Descriptor, code: &str) -> Result<BoundArgs, BindError> {
        let args: MultiValue = lua.load(code).eval().unwrap();
        bind(descriptor, args)
    }

    #[test]
    fn test_keyword_binding() {
        let lua = Lua::new();
        let bound = call(
            &lua,
            &write_descriptor(),
            r#"return { name = "greet", str = "hello", not_if = false }"#,
        )
        .unwrap();

        assert_eq!(bound.require::<String>("str").unwrap(), "hello");
        assert_eq!(bound.require::<String>("name").unwrap(), "greet");
        assert!(!bound.find_or("not_if", true).unwrap());
        assert!(!bound.contains("end"));
    }

    #[test]
    fn test_positional_then_keywords() {
        let lua = Lua::new();
        let bound = call(
            &lua,
            &write_descriptor(),
            r#"return "hello", "!", { name = "greet" }"#,
        )
        .unwrap();

        assert_eq!(bound.require::<String>("end").unwrap(), "!");
    }

    #[test]
    fn test_missing_required_argument() {
        let lua = Lua::new();
        let err = call(&lua, &write_descriptor(), r#"return { str = "x" }"#).unwrap_err();
        assert_eq!(err.to_string(), "write: missing argument for name");
    }

    #[test]
    fn test_unknown_keyword_rejected() {
        let lua = Lua::new();
        let err = call(
            &lua,
            &write_descriptor(),
            r#"return { name = "n", str = "x", colour = "red" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BindError::Unexpected { ref key, .. } if key == "colour"));
    }

    #[test]
    fn test_duplicate_positional_and_keyword() {
        let lua = Lua::new();
        let err = call(
            &lua,
            &write_descriptor(),
            r#"return "x", { name = "n", str = "y" }"#,
        )
        .unwrap_err();
        assert!(matches!(err, BindError::Duplicate { .. }));
    }

    #[test]
    fn test_type_mismatch() {
        let lua = Lua::new();
        let err = call(
            &lua,
            &write_descriptor(),
            r#"return { name = "n", str = 42 }"#,
        )
        .unwrap_err();
        assert_eq!(
            err.to_string(),
            "write: for parameter str: got integer, want string"
        );
    }

    #[test]
    fn test_nil_for_double_question_is_absent() {
        let lua = Lua::new();
        let bound = call(&lua, &write_descriptor(), r#"return "x", nil, { name = "n" }"#).unwrap();
        assert!(!bound.contains("end"));
    }

    #[test]
    fn test_list_and_dict_shapes() {
        let lua = Lua::new();
        let d = Descriptor::new(
            "shape",
            &[("items", ArgType::List), ("data", ArgType::Dict)],
        );

        let bound = call(
            &lua,
            &d,
            r#"return { name = "n", items = {"a", "b"}, data = { port = 8080, tags = {} } }"#,
        )
        .unwrap();
        assert_eq!(bound.get("items"), Some(&json!(["a", "b"])));
        assert_eq!(bound.get("data"), Some(&json!({"port": 8080, "tags": {}})));

        let empty = call(&lua, &d, r#"return { name = "n", items = {}, data = {} }"#).unwrap();
        assert_eq!(empty.get("items"), Some(&json!([])));

        let err = call(&lua, &d, r#"return { name = "n", items = { k = 1 }, data = {} }"#)
            .unwrap_err();
        assert!(matches!(err, BindError::Type { want: "list", .. }));
    }

    #[test]
    fn test_whole_float_accepted_as_int() {
        let lua = Lua::new();
        let d = Descriptor::new("shard", &[("shard_size", ArgType::Int)]);
        let bound = call(&lua, &d, r#"return { name = "n", shard_size = 100.0 }"#).unwrap();
        assert_eq!(bound.require::<i64>("shard_size").unwrap(), 100);

        let err = call(&lua, &d, r#"return { name = "n", shard_size = 1.5 }"#).unwrap_err();
        assert!(matches!(err, BindError::Type { .. }));
    }

    #[test]
    fn test_result_record_shape() {
        let lua = Lua::new();
        let result = OpResult::succeeded("greet", "hi\n").with_changed(true);

        let value = result_to_lua(&lua, &result).unwrap();
        let table = value.as_table().unwrap();

        assert_eq!(table.get::<String>("name").unwrap(), "greet");
        assert_eq!(table.get::<String>("output").unwrap(), "hi\n");
        assert!(table.get::<bool>("success").unwrap());
        assert!(table.get::<bool>("changed").unwrap());
        assert!(table.get::<LuaValue>("error").unwrap().is_nil());
        assert!(table.get::<LuaValue>("diff").unwrap().is_nil());
    }

    #[test]
    fn test_json_round_trip_through_lua() {
        let lua = Lua::new();
        let original = json!({"hosts": ["a", "b"], "port": 22, "ratio": 0.5, "on": true});

        let value = json_to_lua(&lua, &original).unwrap();
        assert_eq!(lua_to_json(&value).unwrap(), original);
    }
}
