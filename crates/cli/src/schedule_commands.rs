use {
    agentdesk_cron::{parse_schedule, parse_timezone, upcoming},
    chrono::Utc,
};

pub fn print_next(expression: &str, count: usize, timezone: &str) -> anyhow::Result<()> {
    let tz = parse_timezone(timezone)?;
    let descriptor = parse_schedule(expression, tz)?;
    let times = upcoming(&descriptor, Utc::now(), count);

    println!("{descriptor}");
    if times.is_empty() {
        println!("  never fires");
    }
    for t in times {
        println!("  {}", t.with_timezone(&tz).format("%a %Y-%m-%d %H:%M %Z"));
    }
    Ok(())
}
