//! Send a message and list recent events.
//!
//! Reads `MG_DOMAIN`, `MG_API_KEY`, optional `MG_URL`, and `MG_EMAIL_TO`.

use mailgun_client::{Client, ListEventsOptions, Message};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let client = Client::from_env()?;
    let to = std::env::var("MG_EMAIL_TO")?;

    let mut msg = Message::with_recipients(
        format!("Demo <demo@{}>", client.domain()),
        "mailgun-client demo",
        "Testing some Mailgun awesomeness!",
        [to.as_str()],
    )?;
    msg.add_tag("demo");
    msg.set_tracking(false);

    let sent = client.send(&msg).await?;
    println!("Sent: {} ({})", sent.message, sent.id);

    let mut events = client.list_events(ListEventsOptions {
        limit: Some(10),
        ..Default::default()
    });
    if let Some(page) = events.next().await {
        for event in page {
            println!("{:>18.3} {}", event.timestamp, event.event);
        }
    }
    if let Some(err) = events.err() {
        eprintln!("Listing events failed: {err}");
    }

    Ok(())
}
