use anyhow::{bail, Context, Result};
use skycoach::assistant::{
    AspectRatio, AssistantClient, ImageSize, Reply, FALLBACK_REPLY, QUICK_SEARCHES,
};
use skycoach::codec;
use skycoach::config::AssistantConfig;
use skycoach::crm::{self, format_inr, LeadFilter, LeadStatus, PerformanceSnapshot};
use skycoach::devices::pulse::PulseDevices;
use skycoach::devices::{AudioDevices, PlaybackDevice, PLAYBACK_SAMPLE_RATE};
use skycoach::session::{SessionCommand, SessionController, SessionState};
use std::path::Path;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: skycoach <command> [args]

commands:
  live                                   voice coaching session (Ctrl+C to end)
  ask <prompt>                           chat; regulatory questions use grounded search
  quick <prompt>                         low-latency answer
  search [query]                         DGCA/AAI search with sources (no query lists presets)
  insight                                dashboard performance overview
  image <prompt> [--aspect R] [--size S] [--out FILE]
  edit <image-file> <prompt> [--out FILE]
  speak <text> [--out FILE.wav]          plays through the speakers unless --out is given
  leads [--search Q] [--source S] [--status S] [--course C]
  courses                                course catalogue
  pipeline                               leads per pipeline stage
  strategy <lead-id>                     closing strategy and next steps for a lead";

fn take_flag(args: &mut Vec<String>, name: &str) -> Option<String> {
    let pos = args.iter().position(|a| a == name)?;
    if pos + 1 >= args.len() {
        return None;
    }
    let value = args.remove(pos + 1);
    args.remove(pos);
    Some(value)
}

fn client() -> Result<AssistantClient> {
    let config = AssistantConfig::from_env().context("loading assistant configuration")?;
    Ok(AssistantClient::new(config)?)
}

fn print_reply(reply: &Reply) {
    println!("{}", reply.text());
    if let Reply::Search(answer) = reply {
        print_sources(&answer.sources);
    }
}

fn print_sources(sources: &[skycoach::assistant::Citation]) {
    if !sources.is_empty() {
        println!("\nSources:");
        for source in sources {
            println!("  - {} <{}>", source.title, source.uri);
        }
    }
}

fn mime_for(path: &Path) -> &'static str {
    match path.extension().and_then(|e| e.to_str()).map(str::to_lowercase).as_deref() {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        _ => "image/png",
    }
}

fn save_data_uri(uri: &str, out: &str) -> Result<()> {
    let (mime, bytes) = codec::decode_data_uri(uri)?;
    std::fs::write(out, &bytes).with_context(|| format!("writing {}", out))?;
    println!("Saved {} ({}, {} bytes)", out, mime, bytes.len());
    Ok(())
}

fn write_wav(path: &str, pcm: &[u8]) -> Result<()> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate: PLAYBACK_SAMPLE_RATE,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };
    let mut writer = hound::WavWriter::create(path, spec)?;
    for sample in pcm.chunks_exact(2) {
        writer.write_sample(i16::from_le_bytes([sample[0], sample[1]]))?;
    }
    writer.finalize()?;
    Ok(())
}

async fn play_pcm(pcm: &[u8]) -> Result<()> {
    let buffer = codec::pcm_bytes_to_audio_buffer(pcm, PLAYBACK_SAMPLE_RATE, 1);
    let duration = buffer.duration();

    let mut output = PulseDevices::default().open_output(PLAYBACK_SAMPLE_RATE).await?;
    let now = output.current_time();
    output.play_at(buffer, now)?;
    output.release();

    // the playback thread exits on its own once drained; keep the process alive until then
    tokio::time::sleep(Duration::from_secs_f64(duration + 0.3)).await;
    Ok(())
}

async fn run_live() -> Result<()> {
    let session = SessionController::new(client()?, PulseDevices::default());
    let mut state = session.subscribe();
    let (tx, rx) = mpsc::channel(4);
    let task = tokio::spawn(session.run(rx));

    tx.send(SessionCommand::Start).await?;
    println!("Live coaching session starting. Press Ctrl+C to end.");

    let ended = async {
        while state.changed().await.is_ok() {
            let current = *state.borrow();
            match current {
                SessionState::Live => println!("Connected. Start speaking."),
                SessionState::Idle => break,
                _ => {}
            }
        }
    };

    tokio::select! {
        _ = tokio::signal::ctrl_c() => info!("Ctrl+C received, ending session"),
        _ = ended => info!("Live session ended"),
    }

    let _ = tx.send(SessionCommand::Shutdown).await;
    task.await?;
    Ok(())
}

async fn run_strategy(lead_id: &str) -> Result<()> {
    let leads = crm::mock_leads();
    let Some(lead) = leads.iter().find(|l| l.id == lead_id) else {
        bail!("no lead with id {}", lead_id);
    };

    let strategy = match client()?.solve_complex_problem(&crm::lead_strategy_prompt(lead)).await {
        Ok(text) => crm::parse_lead_strategy(&text),
        Err(e) => {
            error!("Strategy request failed: {}", e);
            crm::LeadStrategy::unavailable()
        }
    };

    println!("{} ({}, {})", lead.name, lead.status.label(), lead.course_interest);
    println!("\nStrategy: {}", strategy.strategy);
    println!("\nNext steps:");
    for (i, step) in strategy.next_steps.iter().enumerate() {
        println!("  {}. {}", i + 1, step);
    }
    for activity in crm::mock_activities(&lead.id) {
        println!("  [{:?}] {} - {} ({})", activity.kind, activity.timestamp, activity.description, activity.agent);
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let mut args: Vec<String> = std::env::args().skip(1).collect();
    if args.is_empty() {
        println!("{}", USAGE);
        return Ok(());
    }
    let command = args.remove(0);

    match command.as_str() {
        "live" => run_live().await?,
        "ask" => match client()?.ask(&args.join(" ")).await {
            Ok(reply) => print_reply(&reply),
            Err(e) => {
                error!("ask failed: {}", e);
                println!("{}", FALLBACK_REPLY);
            }
        },
        "quick" => match client()?.quick_feedback(&args.join(" ")).await {
            Ok(text) => println!("{}", text),
            Err(e) => {
                error!("quick feedback failed: {}", e);
                println!("{}", FALLBACK_REPLY);
            }
        },
        "search" => {
            if args.is_empty() {
                for preset in QUICK_SEARCHES {
                    println!("{}", preset);
                }
                return Ok(());
            }
            match client()?.search_regulations(&args.join(" ")).await {
                Ok(answer) => {
                    println!("{}", answer.text);
                    print_sources(&answer.sources);
                }
                Err(e) => {
                    error!("search failed: {}", e);
                    println!("{}", FALLBACK_REPLY);
                }
            }
        }
        "insight" => {
            let snapshot = PerformanceSnapshot::from_leads(&crm::mock_leads());
            match client()?.analyze_performance(&snapshot).await {
                Ok(text) => println!("{}", text),
                Err(e) => {
                    error!("performance analysis failed: {}", e);
                    println!("{}", FALLBACK_REPLY);
                }
            }
        }
        "image" => {
            let aspect: AspectRatio = take_flag(&mut args, "--aspect")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default();
            let size: ImageSize = take_flag(&mut args, "--size")
                .map(|s| s.parse())
                .transpose()?
                .unwrap_or_default();
            let out = take_flag(&mut args, "--out").unwrap_or_else(|| "skycoach.png".to_string());

            let uri = client()?.generate_image(&args.join(" "), aspect, size).await?;
            save_data_uri(&uri, &out)?;
        }
        "edit" => {
            let out = take_flag(&mut args, "--out").unwrap_or_else(|| "skycoach-edit.png".to_string());
            if args.len() < 2 {
                bail!("edit needs an image file and a prompt");
            }
            let path = Path::new(&args[0]);
            let image = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;

            let uri = client()?
                .edit_image(&codec::encode_bytes(&image), &args[1..].join(" "), mime_for(path))
                .await?;
            save_data_uri(&uri, &out)?;
        }
        "speak" => {
            let out = take_flag(&mut args, "--out");
            let pcm = client()?.speak(&args.join(" ")).await?;
            match out {
                Some(path) => {
                    write_wav(&path, &pcm)?;
                    println!("Saved {}", path);
                }
                None => play_pcm(&pcm).await?,
            }
        }
        "leads" => {
            let courses = match take_flag(&mut args, "--course") {
                Some(query) => match crm::find_course(&query) {
                    Some(course) => vec![course.to_string()],
                    None => bail!("no course matching {:?}; see `skycoach courses`", query),
                },
                None => Vec::new(),
            };
            let filter = LeadFilter {
                search: take_flag(&mut args, "--search").unwrap_or_default(),
                source: take_flag(&mut args, "--source"),
                statuses: take_flag(&mut args, "--status")
                    .map(|s| s.parse::<LeadStatus>())
                    .transpose()?
                    .into_iter()
                    .collect(),
                courses,
            };
            let leads = crm::mock_leads();
            for lead in filter.apply(&leads) {
                println!(
                    "{:>3}  {:<16} {:<12} \u{20b9}{:>10}  {}",
                    lead.id,
                    lead.name,
                    lead.status.label(),
                    format_inr(lead.estimated_value),
                    lead.course_interest
                );
            }
        }
        "courses" => {
            for course in crm::COURSE_OPTIONS {
                println!("{}", course);
            }
        }
        "pipeline" => {
            let leads = crm::mock_leads();
            for column in crm::pipeline(&leads) {
                println!(
                    "{} ({} leads, \u{20b9}{})",
                    column.label,
                    column.leads.len(),
                    format_inr(column.total_value)
                );
                for lead in column.leads {
                    println!("    {} - \u{20b9}{}", lead.name, format_inr(lead.estimated_value));
                }
            }
        }
        "strategy" => {
            let Some(id) = args.first() else {
                bail!("strategy needs a lead id");
            };
            run_strategy(id).await?;
        }
        other => {
            println!("unknown command: {}\n\n{}", other, USAGE);
        }
    }

    Ok(())
}
