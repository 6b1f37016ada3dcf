use market_dashboard_sdk::{init_tracing, Dashboard, LoaderConfig, LoaderEvent};
use std::time::Instant;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    init_tracing();

    // 1. Wire everything once, the way a host application would
    let dashboard = Dashboard::bootstrap(LoaderConfig::from_env())?;
    println!(
        "Loading dashboard data from {}...",
        dashboard.config().api_base_url
    );
    println!("-------------------------------------------");

    // 2. Print progress as the pipeline advances
    let mut events = dashboard.loader().subscribe_events();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            if let LoaderEvent::StateChanged { state, .. } = &event {
                println!("   [{:>3}%] {}", state.progress, state.current_step);
            }
        }
    });

    // 3. Two views mounting together share one load
    let start = Instant::now();
    let (first, second) = tokio::join!(dashboard.mount(), dashboard.mount());
    let loaded = match (first, second) {
        (Ok(loaded), Ok(_)) => loaded,
        (Err(e), _) | (_, Err(e)) => {
            eprintln!("   Error: {}", e);
            return Ok(());
        }
    };
    let elapsed = start.elapsed();

    let data = &loaded.data;
    println!();
    println!("Summary:");
    if let Some(global) = &data.global_market_data {
        println!(
            "- Total market cap: ${:.0}",
            global.data.total_market_cap_usd().unwrap_or_default()
        );
        println!(
            "- BTC dominance:    {:.1}%",
            global.data.dominance("btc").unwrap_or_default()
        );
    }
    if let Some(trending) = &data.trending_coins {
        let names: Vec<&str> = trending
            .coins
            .iter()
            .take(5)
            .map(|c| c.item.name.as_str())
            .collect();
        println!("- Trending:         {}", names.join(", "));
    }
    println!(
        "- Top list:         {} coins",
        data.top_cryptos.as_ref().map_or(0, Vec::len)
    );
    println!(
        "- Universe:         {} coins",
        data.all_cryptos.as_ref().map_or(0, Vec::len)
    );
    println!("- Load time:        {:?}", elapsed);

    // 4. A later mount is served from the cache
    let start_cached = Instant::now();
    dashboard.mount().await?;
    println!("- Cached mount:     {:?}", start_cached.elapsed());

    Ok(())
}
