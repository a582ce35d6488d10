//! 结构化输出 JSON Schema 生成（schemars 从响应类型自动推导）
//!
//! Schema 与解码器共用同一个 Rust 类型，二者不会漂移。子 schema 全部内联，远程端无需解析 `$ref`。

use schemars::gen::SchemaSettings;
use schemars::JsonSchema;

use crate::progress::{BatchedEvaluation, RoleplayReply, TaskPayload};

/// 生成 T 的内联 JSON Schema（去掉 `$schema` 元信息）
pub fn response_schema<T: JsonSchema>() -> serde_json::Value {
    let generator = SchemaSettings::draft07()
        .with(|s| {
            s.inline_subschemas = true;
            s.meta_schema = None;
        })
        .into_generator();
    let schema = generator.into_root_schema_for::<T>();
    serde_json::to_value(schema).unwrap_or(serde_json::Value::Null)
}

/// 练习题 Task 的 Schema
pub fn task_schema() -> serde_json::Value {
    response_schema::<TaskPayload>()
}

/// 批量评估的 Schema
pub fn batched_evaluation_schema() -> serde_json::Value {
    response_schema::<BatchedEvaluation>()
}

/// 角色扮演回复的 Schema
pub fn roleplay_reply_schema() -> serde_json::Value {
    response_schema::<RoleplayReply>()
}
