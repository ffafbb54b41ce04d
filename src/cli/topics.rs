//! Topic and greeting commands against the chat backend.

use std::error::Error;
use std::sync::PoisonError;

use serde_json::json;

use crate::core::context::AppContext;
use crate::core::topic::{topic_from_value, topics_from_value};

pub async fn list_topics(ctx: &AppContext) -> Result<(), Box<dyn Error>> {
    let body = ctx.chat_api.list_topics(&json!({})).await?;
    let topics = topics_from_value(&body);

    if topics.is_empty() {
        println!("No topics yet. Create one with `chatfront create-topic <title>`.");
    } else {
        for topic in &topics {
            let title = if topic.title.is_empty() {
                "(untitled)"
            } else {
                topic.title.as_str()
            };
            println!("  • [{}] {} ({} messages)", topic.id, title, topic.messages.len());
        }
    }

    ctx.topics
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .set_topics(topics);
    Ok(())
}

pub async fn create_topic(ctx: &AppContext, title: &str) -> Result<(), Box<dyn Error>> {
    let body = ctx.chat_api.create_topic(&json!({ "title": title })).await?;
    match topic_from_value(&body) {
        Some(topic) => {
            println!("✅ Created topic [{}] {}", topic.id, title);
            let mut topics = ctx.topics.lock().unwrap_or_else(PoisonError::into_inner);
            let id = topic.id.clone();
            topics.upsert(topic);
            topics.select(&id);
        }
        None => println!("✅ Created topic {title}"),
    }
    Ok(())
}

pub async fn say_hello(ctx: &AppContext, message: &str) -> Result<(), Box<dyn Error>> {
    let reply = ctx.chat_api.say_hello(&json!({ "message": message })).await?;
    println!("{}", serde_json::to_string_pretty(&reply)?);
    Ok(())
}
