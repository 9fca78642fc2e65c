use chrono::Local;
use execution_time::ExecutionTime;
use indicatif::{ProgressBar, ProgressStyle};
use std::{path::Path, process};
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use analise_ocorrencias::{
    AnaliseError, AnaliseResult, ArmazemChaveValor, ArmazemEmDiretorio, Config, Contexto,
    DadosProcessados, DiretorioMotoristas, Painel, Progresso, RegistroCompartilhado, TabelaPrazos,
    TipoArquivo, TokenCancelamento, clear_screen, exportar_json, get_config, imprimir_painel,
    imprimir_resumo_da_carga, imprimir_versao_do_programa, ingerir_arquivo,
};

fn main() {
    // Erros chegam ao usuário com título e explicação, sem stack trace técnico
    if let Err(err) = run() {
        eprintln!("\n[ERRO] {}: {err}", err.titulo());
        process::exit(1);
    }
}

fn run() -> AnaliseResult<()> {
    let timer = ExecutionTime::start();

    // 1. Obter Configurações
    let config = get_config()?;
    iniciar_logs(config.verbose);

    // 2. Setup inicial
    clear_screen(config.clear)?;
    imprimir_versao_do_programa();

    if config.verbose {
        println!("{:#?}\n", config);
    }

    // 3. Carga: arquivo novo ou conjunto compartilhado
    let armazem = ArmazemEmDiretorio::new(&config.armazem);
    let (dados, origem) = match (&config.arquivo, &config.carregar) {
        (Some(path), _) => {
            let Some(dados) = ingerir_com_barra(path, &config)? else {
                println!(" Processamento cancelado.\n");
                return Ok(());
            };
            if config.salvar {
                salvar(&armazem, &dados, path)?;
            }
            (dados, path.display().to_string())
        }
        (None, Some(id)) => {
            let registro = armazem.carregar(id)?;
            let origem = format!("{} (id {})", registro.file_name, registro.id);
            (registro.into_dados()?, origem)
        }
        (None, None) => return Err(AnaliseError::Config("informe --arquivo ou --carregar".to_string())),
    };

    imprimir_resumo_da_carga(&dados, &origem);

    // 4. Consultas externas (opcionais)
    let prazos = match &config.prazos {
        Some(path) => TabelaPrazos::from_path(path)?,
        None => TabelaPrazos::default(),
    };
    let motoristas = match &config.motoristas {
        Some(path) => DiretorioMotoristas::from_path(path)?,
        None => DiretorioMotoristas::default(),
    };

    // 5. Métricas para o filtro escolhido
    let ctx = Contexto {
        prazos: &prazos,
        dia: config.dia,
        hoje: Local::now().date_naive(),
    };
    let painel = Painel::calcular(&dados, &config.filtro, &ctx, &motoristas);
    imprimir_painel(&painel, config.top);

    // 6. Exportação
    if let Some(json) = &config.json {
        exportar_json(&painel, json)?;
    }

    println!(" Análise concluída com sucesso.\n");
    timer.print_elapsed_time();

    Ok(())
}

/// `RUST_LOG` tem prioridade; sem ele, `info` (ou `debug` com --verbose).
fn iniciar_logs(verbose: bool) {
    let nivel = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("analise_ocorrencias={nivel}")));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr).compact())
        .init();
}

fn ingerir_com_barra(path: &Path, config: &Config) -> AnaliseResult<Option<DadosProcessados>> {
    let barra = ProgressBar::new(100);
    barra.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos:>3}% {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("#>-"),
    );

    let token = TokenCancelamento::new();
    let mut progresso = |p: &Progresso| {
        barra.set_position(u64::from(p.percentual));
        barra.set_message(p.mensagem.clone());
    };

    let resultado = ingerir_arquivo(path, &config.opcoes, &token, &mut progresso);
    barra.finish_and_clear();

    Ok(resultado?.concluido())
}

fn salvar(armazem: &ArmazemEmDiretorio, dados: &DadosProcessados, path: &Path) -> AnaliseResult<()> {
    let tipo = TipoArquivo::from_path(path)?;
    let nome = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());

    let registro = RegistroCompartilhado::from_dados(dados, &nome, tipo)?;
    armazem.salvar(&registro)?;

    println!(
        " ---> Conjunto salvo em <{}> com id: {}\n",
        armazem.diretorio().display(),
        registro.id
    );
    Ok(())
}
