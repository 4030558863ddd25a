//! Basic example demonstrating `{ data, error }` replies and typed helpers.
//!
//! This example shows how to:
//! - Create a client with a base URL
//! - Fetch with path parameters and inspect the reply
//! - Handle an HTTP error without raising it
//! - Make typed GET and POST requests
//!
//! Run with: `cargo run --example basic_fetch`

use fetchling::{Client, Error, FetchOptions};
use serde::{Deserialize, Serialize};

#[derive(Debug, Deserialize)]
#[allow(dead_code)]
struct Post {
    #[serde(rename = "userId")]
    user_id: u32,
    id: u32,
    title: String,
    body: String,
}

#[derive(Debug, Serialize)]
struct NewPost {
    title: String,
    body: String,
    #[serde(rename = "userId")]
    user_id: u32,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Initialize tracing for logging
    tracing_subscriber::fmt()
        .with_env_filter("fetchling=debug,basic_fetch=info")
        .init();

    let client = Client::builder()
        .base_url("https://jsonplaceholder.typicode.com")?
        .build()?;

    println!("=== Fetch With Path Parameters ===");
    let reply = client
        .fetch("/posts/:id", FetchOptions::new().with_param("id", "1"))
        .await?;
    println!("Status: {:?}", reply.status);
    println!("Data: {:?}", reply.data);
    println!();

    println!("=== HTTP Errors Are Values ===");
    let reply = client.fetch("/posts/does-not-exist", FetchOptions::new()).await?;
    if let Some(error) = &reply.error {
        println!("Error: {} {}", error.status, error.status_text);
    }
    println!();

    println!("=== Typed Requests ===");
    let post = client.get::<Post>("/posts/1").await?;
    if let Some(post) = &post.data {
        println!("Title: {}", post.title);
    }

    let new_post = NewPost {
        title: "My New Post".to_string(),
        body: "This is the content of my new post!".to_string(),
        user_id: 1,
    };
    let created = client.post::<_, Post>("/posts", &new_post).await?;
    if let Some(post) = &created.data {
        println!("Created post ID: {}", post.id);
    }
    println!("Content-Type: {:?}", created.header("content-type"));
    println!("Was retried: {}", created.was_retried());

    Ok(())
}
