use autoscope_core::{stmt::Value, Error, Result};
use bytes::BytesMut;
use tokio_postgres::types::{to_sql_checked, IsNull, ToSql, Type};

/// Bridges the engine's dynamically typed [`Value`] to the postgres wire
/// protocol. The server tells us the parameter type it inferred from the
/// statement; we coerce to it.
#[derive(Debug)]
pub(crate) struct PgValue(pub(crate) Value);

impl ToSql for PgValue {
    fn to_sql(
        &self,
        ty: &Type,
        out: &mut BytesMut,
    ) -> std::result::Result<IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match &self.0 {
            Value::Null => Ok(IsNull::Yes),
            Value::Bool(v) => v.to_sql(ty, out),
            Value::I64(v) => {
                if *ty == Type::INT2 {
                    (*v as i16).to_sql(ty, out)
                } else if *ty == Type::INT4 {
                    (*v as i32).to_sql(ty, out)
                } else if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::FLOAT8 {
                    (*v as f64).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::F64(v) => {
                if *ty == Type::FLOAT4 {
                    (*v as f32).to_sql(ty, out)
                } else if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::String(v) => {
                if *ty == Type::JSON || *ty == Type::JSONB {
                    serde_json::Value::String(v.clone()).to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
            Value::Json(v) => {
                if *ty == Type::TEXT || *ty == Type::VARCHAR {
                    v.to_string().to_sql(ty, out)
                } else {
                    v.to_sql(ty, out)
                }
            }
        }
    }

    fn accepts(_: &Type) -> bool {
        true
    }

    to_sql_checked!();
}

/// Decodes one column of a result row into a [`Value`], driven by the
/// column's postgres type.
pub(crate) fn from_sql(row: &tokio_postgres::Row, index: usize) -> Result<Value> {
    let ty = row.columns()[index].type_().clone();

    let decoded = if ty == Type::BOOL {
        row.try_get::<_, Option<bool>>(index)
            .map(|v| v.map(Value::Bool))
    } else if ty == Type::INT2 {
        row.try_get::<_, Option<i16>>(index)
            .map(|v| v.map(|v| Value::I64(v.into())))
    } else if ty == Type::INT4 {
        row.try_get::<_, Option<i32>>(index)
            .map(|v| v.map(|v| Value::I64(v.into())))
    } else if ty == Type::INT8 {
        row.try_get::<_, Option<i64>>(index)
            .map(|v| v.map(Value::I64))
    } else if ty == Type::FLOAT4 {
        row.try_get::<_, Option<f32>>(index)
            .map(|v| v.map(|v| Value::F64(v.into())))
    } else if ty == Type::FLOAT8 {
        row.try_get::<_, Option<f64>>(index)
            .map(|v| v.map(Value::F64))
    } else if ty == Type::TEXT || ty == Type::VARCHAR || ty == Type::BPCHAR || ty == Type::NAME {
        row.try_get::<_, Option<String>>(index)
            .map(|v| v.map(Value::String))
    } else if ty == Type::JSON || ty == Type::JSONB {
        row.try_get::<_, Option<serde_json::Value>>(index)
            .map(|v| v.map(Value::from_json))
    } else {
        return Err(Error::backend(format!(
            "unknown postgres type returned: {ty}"
        )));
    };

    decoded
        .map(|v| v.unwrap_or(Value::Null))
        .map_err(Error::backend)
}
