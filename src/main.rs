//! rsautoclose 命令行工具
//!
//! - `rsautoclose glob`     翻译/测试通配模式
//! - `rsautoclose wait`     解析等待时间
//! - `rsautoclose defaults` 输出内置默认规则
//! - `rsautoclose check`    检查会话是否命中规则
//! - `rsautoclose simulate` 以模拟宿主跑完整的倒计时关闭流程

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info};
use tracing_subscriber::fmt::time::ChronoLocal;
use tracing_subscriber::EnvFilter;

use rsautoclose::{
    bootstrap, default_rules, ClosureController, ClosureState, ConfigManager, ConfigStore,
    ContentProbe, FileConfigStore, GlobMode, GlobalConfig, HttpContentProbe, MemoryConfigStore,
    NoContentProbe, OverlayEvent, PageTextProbe, PatternCompiler, RuleCompiler, Session,
    SessionMatcher, SimulatedHost, WaitSpec,
};

#[derive(Parser)]
#[command(
    name = "rsautoclose",
    version,
    about = "Rule-driven auto-close engine for browser sessions",
    propagate_version = true
)]
struct Cli {
    /// 输出调试日志
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// 翻译通配模式，并可选地测试输入
    Glob(GlobArgs),
    /// 解析等待时间
    Wait {
        spec: String,
    },
    /// 输出内置默认规则（JSON）
    Defaults,
    /// 检查会话是否命中规则
    Check(CheckArgs),
    /// 模拟一次完整的倒计时关闭
    Simulate(SimulateArgs),
}

#[derive(Args)]
struct GlobArgs {
    /// 匹配模式：pathStart / textAll / textHas
    #[arg(short, long, default_value = "pathStart")]
    mode: GlobMode,

    pattern: String,

    /// 待测试的输入，可重复
    #[arg(short, long)]
    test: Vec<String>,
}

#[derive(Args)]
struct CheckArgs {
    #[arg(long)]
    url: String,

    #[arg(long, default_value = "")]
    title: String,

    /// 规则文件（.json / .mp），默认使用配置中的存储路径；不存在时写入默认规则
    #[arg(short, long)]
    rules: Option<PathBuf>,

    /// 只在内存中使用默认规则，不读写规则文件
    #[arg(long, conflicts_with = "rules")]
    in_memory: bool,

    /// 页面 HTML 文件，用于内容规则
    #[arg(long, conflicts_with = "fetch")]
    html: Option<PathBuf>,

    /// 通过 HTTP 抓取页面内容
    #[arg(long)]
    fetch: bool,
}

#[derive(Args)]
struct SimulateArgs {
    #[arg(long)]
    url: String,

    #[arg(long, default_value = "")]
    title: String,

    #[arg(short, long)]
    rules: Option<PathBuf>,

    #[arg(long, conflicts_with = "rules")]
    in_memory: bool,

    #[arg(long)]
    html: Option<PathBuf>,

    /// 在倒计时开始若干秒后点击遮罩取消
    #[arg(long)]
    cancel_after: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = ConfigManager::custom().verbose(cli.verbose).build();
    let result = match cli.command {
        Commands::Glob(args) => glob(args),
        Commands::Wait { spec } => wait(&spec, &config),
        Commands::Defaults => defaults(),
        Commands::Check(args) => check(args, config).await,
        Commands::Simulate(args) => simulate(args, config).await,
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_timer(ChronoLocal::rfc_3339())
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn glob(args: GlobArgs) -> anyhow::Result<()> {
    let pattern = PatternCompiler::compile(&args.pattern, args.mode)
        .with_context(|| format!("无法编译模式 `{}`", args.pattern))?;
    println!("source: {}", pattern.source());
    println!("flags:  {}", pattern.flags());
    for input in &args.test {
        println!("{:<5} {}", pattern.is_match(input), input);
    }
    Ok(())
}

fn wait(spec: &str, config: &GlobalConfig) -> anyhow::Result<()> {
    match WaitSpec::parse(spec) {
        Some(parsed) => println!("{} = {:?}", parsed, parsed.duration()),
        None => println!(
            "无效，使用默认值 {} = {:?}",
            config.default_wait,
            WaitSpec::resolve(None, &config.default_wait)
        ),
    }
    Ok(())
}

fn defaults() -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(&default_rules())?);
    Ok(())
}

/// 打开规则存储，首次运行时写入默认规则
async fn open_store(
    rules: Option<PathBuf>,
    in_memory: bool,
    config: &GlobalConfig,
) -> anyhow::Result<Box<dyn ConfigStore>> {
    let store: Box<dyn ConfigStore> = if in_memory {
        Box::new(MemoryConfigStore::new())
    } else {
        let path = rules.unwrap_or_else(|| config.store_path.clone());
        debug!(path = %path.display(), "使用规则文件");
        Box::new(FileConfigStore::new(path))
    };
    let rules = bootstrap(&*store).await.context("规则存储初始化失败")?;
    debug!("已加载 {} 条规则", rules.len());
    Ok(store)
}

async fn page_probe(session: &Session, html: &Path) -> anyhow::Result<Arc<PageTextProbe>> {
    let content = tokio::fs::read_to_string(html)
        .await
        .with_context(|| format!("读取 {} 失败", html.display()))?;
    let probe = Arc::new(PageTextProbe::new());
    probe.set_html(session.id, &content).await;
    Ok(probe)
}

async fn check(args: CheckArgs, config: GlobalConfig) -> anyhow::Result<()> {
    let store = open_store(args.rules, args.in_memory, &config).await?;
    let rules = RuleCompiler::compile(&store.subscribe().borrow().clone());
    let session = Session::complete(1, args.url, args.title);

    let probe: Arc<dyn ContentProbe> = match (&args.html, args.fetch) {
        (Some(html), _) => page_probe(&session, html).await?,
        (None, true) => Arc::new(HttpContentProbe::new(&config)?),
        (None, false) => Arc::new(NoContentProbe),
    };

    match SessionMatcher::new(probe).should_close(&rules, &session).await {
        Some(rule) => {
            let wait = WaitSpec::resolve(rule.wait.as_deref(), &config.default_wait);
            println!("命中规则 #{}，{:?} 后关闭", rule.index, wait);
        }
        None => println!("未命中任何规则"),
    }
    Ok(())
}

async fn simulate(args: SimulateArgs, config: GlobalConfig) -> anyhow::Result<()> {
    let store = open_store(args.rules, args.in_memory, &config).await?;
    let session = Session::complete(1, args.url, args.title);
    let probe = match &args.html {
        Some(html) => page_probe(&session, html).await?,
        None => Arc::new(PageTextProbe::new()),
    };
    let host = Arc::new(SimulatedHost::new(config.overlay_theme.clone()));
    let grace = config.fallback_grace;

    let (controller, inbox) = ClosureController::new(config, &*store, probe, host.clone());
    let (sessions, sessions_rx) = mpsc::channel(8);
    let runner = tokio::spawn(Arc::clone(&controller).run(sessions_rx, inbox));

    sessions.send(session.clone()).await?;
    sleep(Duration::from_millis(200)).await;

    let wait = match controller.state(session.id).await {
        ClosureState::CountingDown { wait, .. } => wait,
        ClosureState::None => {
            println!("未命中任何规则，会话保持打开");
            drop(sessions);
            runner.await?;
            return Ok(());
        }
    };
    info!(session = %session.id, ?wait, "倒计时中");

    match args.cancel_after {
        Some(secs) => {
            sleep(Duration::from_secs(secs)).await;
            host.send_event(session.id, OverlayEvent::ClickOverlay).await;
            sleep(wait.saturating_add(grace)).await;
        }
        None => sleep(wait.saturating_add(Duration::from_millis(200))).await,
    }

    if host.removed().await.contains(&session.id) {
        println!("会话 {} 已关闭", session.id);
    } else {
        println!("会话 {} 保持打开", session.id);
    }

    drop(sessions);
    runner.await?;
    Ok(())
}
