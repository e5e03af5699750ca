use rosette_core::{Context, Node, msgs::Text};
use std::{thread, time::Duration};
use tracing::info;

fn main() -> eyre::Result<()> {
    tracing_subscriber::fmt::init();

    let context = Context::new();

    // The talker publishes a greeting every half second
    let mut talker = Node::new(&context, "minimal_publisher")?;
    let publisher = talker.advertise::<Text>("topic", 10)?;
    let mut count = 0;
    talker.create_timer(Duration::from_millis(500), move || {
        let msg = Text::new(format!("Hello World: {count}"));
        info!("Publishing: '{}'", msg.data);
        publisher.publish(&msg)?;
        count += 1;
        Ok(())
    })?;

    // The listener stops after five messages
    let mut listener = Node::new(&context, "minimal_subscriber")?;
    let stop = listener.shutdown_handle();
    let mut heard = 0;
    listener.subscribe("topic", 10, move |msg: Text| {
        info!("I heard: '{}'", msg.data);
        heard += 1;
        if heard == 5 {
            stop.shutdown();
        }
        Ok(())
    })?;

    let talker = thread::spawn(move || talker.spin());
    listener.spin()?;

    context.shutdown();
    talker
        .join()
        .map_err(|_| eyre::eyre!("talker thread panicked"))??;

    Ok(())
}
