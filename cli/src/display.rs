use comfy_table::{presets::UTF8_FULL, ContentArrangement, Table};
use common::{JobRecord, LoraPreset, LORA_PRESETS};
use engine::SessionEvent;
use serde::Serialize;

pub fn format_cost(cost: f64) -> String {
    format!("${:.4}", cost)
}

pub fn format_execution(ms: u64) -> String {
    format!("{:.1}s", ms as f64 / 1000.0)
}

/// Shortens `s` to at most `max` characters, marking the cut with `...`.
pub fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let kept: String = s.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", kept)
}

fn table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic);
    table
}

pub fn history_table(records: &[JobRecord]) -> Table {
    let mut table = table();
    table.set_header(vec!["ID", "Created", "Status", "Prompt", "Time", "Cost"]);
    for record in records {
        table.add_row(vec![
            record.id.to_string(),
            record.created_at.format("%Y-%m-%d %H:%M").to_string(),
            record.status.to_string(),
            truncate(&record.prompt, 40),
            record.execution_time_ms.map(format_execution).unwrap_or_default(),
            record.estimated_cost().map(format_cost).unwrap_or_default(),
        ]);
    }
    table
}

pub fn lora_table() -> Table {
    let mut table = table();
    table.set_header(vec!["Name", "Description", "URL"]);
    for preset in LORA_PRESETS {
        table.add_row(vec![preset.label, preset.description, preset.url]);
    }
    table
}

pub fn print_record(record: &JobRecord) {
    println!("Job Details:");
    println!("  ID:       {}", record.id);
    println!("  Created:  {}", record.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("  Status:   {}", record.status);
    println!("  Prompt:   {}", record.prompt);
    if let Some(ref url) = record.video_url {
        println!("  Video:    {}", url);
    }
    if let Some(ms) = record.execution_time_ms {
        println!("  Time:     {}", format_execution(ms));
    }
    if let Some(cost) = record.estimated_cost() {
        println!("  Cost:     {}", format_cost(cost));
    }
    if let Some(lora) = lora_label(&record.request_payload) {
        println!("  LoRA:     {}", lora);
    }
    println!("  Request:");
    for line in record.request_payload.lines() {
        println!("    {}", line);
    }
}

fn lora_label(request_payload: &str) -> Option<String> {
    let request: serde_json::Value = serde_json::from_str(request_payload).ok()?;
    let url = request.get("input")?.get("lora_url")?.as_str()?;
    Some(
        LoraPreset::find(url)
            .map(|p| p.label.to_string())
            .unwrap_or_else(|| url.to_string()),
    )
}

pub fn describe_event(event: &SessionEvent) -> String {
    match event {
        SessionEvent::Processing { progress, .. } => format!("Processing... {}%", progress),
        SessionEvent::Ready { video_url, execution_time_ms, .. } => match execution_time_ms {
            Some(ms) => format!("Ready in {}: {}", format_execution(*ms), video_url),
            None => format!("Ready: {}", video_url),
        },
        SessionEvent::Failed { .. } => "Generation failed".to_string(),
        SessionEvent::Stalled { attempts, .. } => {
            format!("Gave up after {} unsuccessful checks; run `vidgen watch` to resume", attempts)
        }
    }
}

/// One CSV line of `vidgen export`.
#[derive(Debug, Serialize)]
pub struct ExportRow<'a> {
    pub id: &'a str,
    pub created_at: String,
    pub status: &'static str,
    pub prompt: &'a str,
    pub video_url: &'a str,
    pub execution_time_secs: Option<f64>,
    pub estimated_cost: Option<f64>,
}

impl<'a> From<&'a JobRecord> for ExportRow<'a> {
    fn from(record: &'a JobRecord) -> Self {
        Self {
            id: &record.id.0,
            created_at: record.created_at.to_rfc3339(),
            status: record.status.as_str(),
            prompt: &record.prompt,
            video_url: record.video_url.as_deref().unwrap_or(""),
            execution_time_secs: record.execution_time_ms.map(|ms| ms as f64 / 1000.0),
            estimated_cost: record.estimated_cost(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::{JobId, JobUpdate};

    #[test]
    fn test_formats() {
        assert_eq!(format_cost(0.042), "$0.0420");
        assert_eq!(format_execution(42_049), "42.0s");
        assert_eq!(truncate("short", 40), "short");
        assert_eq!(truncate("abcdefghij", 8), "abcde...");
    }

    #[test]
    fn test_lora_label_prefers_preset_name() {
        let payload = format!(r#"{{"input":{{"lora_url":"{}"}}}}"#, LORA_PRESETS[0].url);
        assert_eq!(lora_label(&payload).as_deref(), Some(LORA_PRESETS[0].label));
        assert_eq!(lora_label(r#"{"input":{}}"#), None);
        assert_eq!(
            lora_label(r#"{"input":{"lora_url":"https://x/y.safetensors"}}"#).as_deref(),
            Some("https://x/y.safetensors")
        );
    }

    #[test]
    fn test_export_rows() {
        let mut record = JobRecord::new(JobId::from("job-1"), "a cat".into(), "{}".into());
        record.apply(&JobUpdate::completed("https://cdn/x.mp4".into(), Some(120_000)));

        let mut writer = csv::Writer::from_writer(vec![]);
        writer.serialize(ExportRow::from(&record)).unwrap();
        let out = String::from_utf8(writer.into_inner().unwrap()).unwrap();

        let mut lines = out.lines();
        assert_eq!(
            lines.next(),
            Some("id,created_at,status,prompt,video_url,execution_time_secs,estimated_cost")
        );
        let row = lines.next().unwrap();
        assert!(row.starts_with("job-1,"));
        assert!(row.ends_with(",completed,a cat,https://cdn/x.mp4,120.0,0.12"));
    }

    #[test]
    fn test_describe_event() {
        let ready = SessionEvent::Ready {
            job_id: JobId::from("job-1"),
            video_url: "https://cdn/x.mp4".into(),
            execution_time_ms: Some(1_500),
        };
        assert_eq!(describe_event(&ready), "Ready in 1.5s: https://cdn/x.mp4");
    }
}
