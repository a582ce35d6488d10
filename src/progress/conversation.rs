//! 角色扮演对话线程
//!
//! 远程端收到的是「除最新一轮以外」的完整历史作为上下文，再追加最新的用户输入；
//! 注释（关键词释义）只挂在模型回复上。

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// 消息角色（与 Gemini contents.role 一致）
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// 关键词释义，用于下游行内注释
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct KeywordMetadata {
    /// 被注释的词，必须出现在所注释的文本中
    pub word: String,
    pub explanation: String,
}

/// 单条消息
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub annotations: Vec<KeywordMetadata>,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            annotations: Vec::new(),
        }
    }

    pub fn model(content: impl Into<String>, annotations: Vec<KeywordMetadata>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            annotations,
        }
    }
}

/// 角色扮演回复（结构化输出）
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct RoleplayReply {
    pub reply: String,
    pub keywords: Vec<KeywordMetadata>,
}

/// 有序对话线程
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationThread {
    messages: Vec<Message>,
}

impl ConversationThread {
    pub fn new() -> Self {
        Self::default()
    }

    /// 以模型问候开场
    pub fn with_greeting(scenario_title: &str) -> Self {
        Self {
            messages: vec![Message::model(
                format!("Hola. Bienvenido a {scenario_title}."),
                Vec::new(),
            )],
        }
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.messages.push(Message::user(content));
    }

    pub fn push_reply(&mut self, reply: RoleplayReply) {
        self.messages.push(Message::model(reply.reply, reply.keywords));
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    /// 拆分为（历史上下文，最新用户输入）；最后一条不是用户消息时返回 None
    pub fn split_latest_user(&self) -> Option<(&[Message], &Message)> {
        match self.messages.split_last() {
            Some((last, history)) if last.role == Role::User => Some((history, last)),
            _ => None,
        }
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_latest_user() {
        let mut thread = ConversationThread::with_greeting("Wine Pairing");
        assert!(thread.split_latest_user().is_none());

        thread.push_user("Quisiera un vino tinto.");
        let (history, latest) = thread.split_latest_user().unwrap();
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].role, Role::Model);
        assert_eq!(latest.content, "Quisiera un vino tinto.");
    }

    #[test]
    fn test_annotations_only_on_model_turns() {
        let mut thread = ConversationThread::new();
        thread.push_user("Hola");
        thread.push_reply(RoleplayReply {
            reply: "Hola, ¿qué desea?".into(),
            keywords: vec![KeywordMetadata {
                word: "desea".into(),
                explanation: "wants (formal)".into(),
            }],
        });
        assert!(thread.messages()[0].annotations.is_empty());
        assert_eq!(thread.messages()[1].annotations.len(), 1);
        assert_eq!(thread.len(), 2);
    }

    #[test]
    fn test_user_message_serializes_without_annotations() {
        let json = serde_json::to_value(Message::user("hola")).unwrap();
        assert_eq!(json, serde_json::json!({"role": "user", "content": "hola"}));
    }
}
