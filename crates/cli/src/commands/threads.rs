//! `finassist threads`: list or delete a user's threads.

use std::path::Path;

pub async fn run(config_path: Option<&Path>, user: &str, delete: Option<String>) -> anyhow::Result<()> {
    let config = super::load_config(config_path)?;
    let stores = super::open_stores(&config)?;

    if let Some(thread_id) = delete {
        if stores.threads.delete_thread(user, &thread_id).await? {
            println!("Deleted thread {thread_id}");
        } else {
            println!("No thread {thread_id} for user {user}");
        }
        return Ok(());
    }

    let threads = stores.threads.list_threads(user).await?;
    if threads.is_empty() {
        println!("No threads for user {user}");
        return Ok(());
    }

    println!("Threads for {user} ({}):", threads.len());
    for record in &threads {
        println!(
            "  {}  {}  {}",
            record.thread_id,
            record.updated_at.format("%Y-%m-%d %H:%M"),
            record.title.as_deref().unwrap_or("(untitled)")
        );
    }
    Ok(())
}
