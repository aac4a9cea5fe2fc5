//! 命令行入口

use std::io::Read;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;

use clap::{Parser, Subcommand};

use article_illustrator::clock::{Clock, SystemClock};
use article_illustrator::env::{core::LogLevel, generate_env_docs, EnvConfig, EnvVar};
use article_illustrator::illustration::config::config_file_exists;
use article_illustrator::illustration::{
    illustration_file_name, ConfigManager, IllustrationRequest, IllustrationService,
    ReqwestTransport,
};
use article_illustrator::storage::{
    format_mib, format_relative_time, DailyQuota, HistoryLog, ImagePresence, KeyValueStore,
    RedbStore, TtlCache,
};
use article_illustrator::utils::parse_data_url;

#[derive(Parser, Debug)]
#[command(name = "article-illustrator", version, about = "Generate an illustration for an article")]
struct Cli {
    /// Config file (TOML or JSON)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Generate an illustration from article text
    Illustrate {
        /// Article text file, `-` for stdin
        #[arg(short, long, default_value = "-")]
        input: String,

        /// Instruction language: `me` or `ru`
        #[arg(short, long, default_value = "ru")]
        lang: String,

        /// Source URL recorded in history
        #[arg(short, long)]
        url: Option<String>,

        /// Output directory
        #[arg(short, long, default_value = ".")]
        output: PathBuf,
    },

    /// Show or reset today's quota
    Quota {
        #[arg(long)]
        reset: bool,
    },

    /// Inspect history
    History {
        #[command(subcommand)]
        action: HistoryAction,
    },

    /// Inspect the cache
    Cache {
        #[command(subcommand)]
        action: CacheAction,
    },

    /// Configuration helpers
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand, Debug)]
enum HistoryAction {
    List,
    Show { id: String },
    Remove { id: String },
    Clear,
}

#[derive(Subcommand, Debug)]
enum CacheAction {
    Stats,
    Sweep,
    Clear,
}

#[derive(Subcommand, Debug)]
enum ConfigAction {
    /// Write an example config file
    Example { path: PathBuf },
    /// Show environment variables and their current values
    Env,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    init_logging();

    if let Command::Config {
        action: ConfigAction::Example { path },
    } = &cli.command
    {
        ConfigManager::generate_example_config(path)?;
        println!("示例配置已写入 {}", path.display());
        return Ok(());
    }

    if let Command::Config {
        action: ConfigAction::Env,
    } = &cli.command
    {
        print!("{}", generate_env_docs());
        println!();
        EnvConfig::from_env()?.print_summary();
        if !config_file_exists() {
            println!("未找到配置文件，可以使用 `config example <path>` 生成");
        }
        return Ok(());
    }

    let manager = match &cli.config {
        Some(path) => ConfigManager::from_path(path)?,
        None => ConfigManager::new()?,
    };
    let (config, credentials) = manager.into_parts();

    let store: Arc<dyn KeyValueStore> = Arc::new(RedbStore::open(config.expanded_state_path())?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let quota = Arc::new(DailyQuota::new(store.clone(), clock.clone(), config.daily_image_limit));
    let history = Arc::new(HistoryLog::new(store.clone(), clock.clone()));

    match cli.command {
        Command::Illustrate {
            input,
            lang,
            url,
            output,
        } => {
            let article_text = read_input(&input)?;
            let transport = Arc::new(ReqwestTransport::new(config.request_timeout())?);
            let service = IllustrationService::new(&config, credentials, transport, quota, history);

            let mut request = IllustrationRequest::new(article_text, lang);
            if let Some(url) = url {
                request = request.with_source_url(url);
            }

            let illustration = match service.generate(request).await {
                Ok(illustration) => illustration,
                Err(e) => {
                    eprintln!("❌ {}", e);
                    eprintln!("   {}", e.user_hint());
                    std::process::exit(1);
                }
            };

            let (_, bytes) = parse_data_url(&illustration.image_data_uri)
                .ok_or("生成的图片不是有效的数据URL")?;
            std::fs::create_dir_all(&output)?;
            let file = output.join(illustration_file_name(clock.now_millis()));
            std::fs::write(&file, bytes)?;

            println!("✅ 插图已保存: {}", file.display());
            println!("   服务: {}", illustration.provider_label);
            println!("   提示词: {}", illustration.prompt_text);
            println!("   今日剩余: {}", service.remaining_quota());
        }
        Command::Quota { reset } => {
            if reset {
                quota.reset();
                println!("配额已重置");
            }
            let record = quota.snapshot();
            let until_reset = quota.time_until_reset();
            println!(
                "{}: 已用 {}/{}，剩余 {}，{} 小时 {} 分钟后重置",
                record.date_key,
                record.count,
                quota.daily_limit(),
                quota.remaining(),
                until_reset.num_hours(),
                until_reset.num_minutes() % 60
            );
        }
        Command::History { action } => match action {
            HistoryAction::List => {
                let now = clock.now();
                for item in history.list() {
                    println!(
                        "{}  {:<12} {:<4} {:<14} {}",
                        item.id,
                        item.operation_kind.as_str(),
                        item.language,
                        format_relative_time(item.created_at, now),
                        item.url
                    );
                }
            }
            HistoryAction::Show { id } => match history.get(&id) {
                Some(item) => {
                    println!("{}", serde_json::to_string_pretty(&item)?);
                    if item.image_presence == ImagePresence::Elided {
                        println!("(图片未保存在历史记录中)");
                    }
                }
                None => {
                    eprintln!("未找到记录 {}", id);
                    std::process::exit(1);
                }
            },
            HistoryAction::Remove { id } => {
                history.remove(&id);
                println!("已删除 {}", id);
            }
            HistoryAction::Clear => {
                history.clear();
                println!("历史记录已清空");
            }
        },
        Command::Cache { action } => {
            let cache = TtlCache::new(store.clone(), clock.clone());
            match action {
                CacheAction::Stats => {
                    let stats = cache.stats();
                    println!("条目: {}", stats.total);
                    println!("大小: {}", format_mib(stats.total_size_bytes));
                    for (category, count) in &stats.by_category {
                        println!("  {}: {}", category, count);
                    }
                }
                CacheAction::Sweep => println!("已删除 {} 个过期条目", cache.sweep_expired()),
                CacheAction::Clear => println!("已删除 {} 个条目", cache.clear_all()),
            }
        }
        Command::Config { .. } => {}
    }

    Ok(())
}

fn init_logging() {
    let level = LogLevel::get()
        .ok()
        .and_then(|level| tracing::Level::from_str(&level).ok())
        .unwrap_or(tracing::Level::INFO);

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .init();
}

fn read_input(input: &str) -> std::io::Result<String> {
    if input == "-" {
        let mut text = String::new();
        std::io::stdin().read_to_string(&mut text)?;
        Ok(text)
    } else {
        std::fs::read_to_string(input)
    }
}
