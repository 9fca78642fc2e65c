use clap::Parser;
use std::path::PathBuf;

use crate::{
    AnaliseError, AnaliseResult, FiltroDia, FiltroSelecao, OpcoesIngestao, Selecao,
    TAMANHO_AMOSTRA_PADRAO, TAMANHO_LOTE_PADRAO,
};

// Estrutura para o Clap processar os argumentos da linha de comando
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Arguments {
    /// Arquivo de rastreamento a ser analisado.
    ///
    /// Extensões aceitas: `.csv`, `.sswweb` e `.xlsx`.
    #[arg(short, long, required_unless_present = "carregar", conflicts_with = "carregar")]
    arquivo: Option<PathBuf>,

    /// Carregar um conjunto compartilhado pelo seu id
    #[arg(long)]
    carregar: Option<String>,

    /// Salvar o conjunto processado no armazém (imprime o id gerado)
    #[arg(long, default_value_t = false)]
    salvar: bool,

    /// Diretório do armazém de conjuntos compartilhados
    #[arg(long, default_value = ".analise_ocorrencias")]
    armazem: PathBuf,

    /// Linhas por lote enviado ao agregador
    #[arg(long, default_value_t = TAMANHO_LOTE_PADRAO)]
    lote: usize,

    /// Linhas mantidas como amostra
    #[arg(long, default_value_t = TAMANHO_AMOSTRA_PADRAO)]
    amostra: usize,

    /// UF de entrega (ou `todas`)
    #[arg(long, default_value = "todas")]
    uf: String,

    /// Unidades separadas por vírgula (ex.: `BLU,JOI`)
    #[arg(long, value_delimiter = ',')]
    unidades: Vec<String>,

    /// Códigos de ocorrência separados por vírgula (ex.: `1,59`)
    #[arg(long, value_delimiter = ',')]
    codigos: Vec<String>,

    /// Tabela de prazos no formato `cidade;unidade;prazo`
    #[arg(long)]
    prazos: Option<PathBuf>,

    /// Diretório de motoristas no formato `placa;unidade;motorista`
    #[arg(long)]
    motoristas: Option<PathBuf>,

    /// Considerar apenas insucessos com última ocorrência hoje
    #[arg(long, default_value_t = false, conflicts_with = "exceto_hoje")]
    hoje: bool,

    /// Considerar apenas insucessos com última ocorrência anterior a hoje
    #[arg(long, default_value_t = false)]
    exceto_hoje: bool,

    /// Exportar todas as métricas para um arquivo JSON
    #[arg(long)]
    json: Option<PathBuf>,

    /// Quantidade de itens exibidos nos rankings
    #[arg(long, default_value_t = 20)]
    top: usize,

    /// Clear screen
    #[arg(short, long, default_value_t = false)]
    clear: bool,

    /// Ativar modo detalhado (verbose)
    #[arg(short, long, default_value_t = false)]
    verbose: bool,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub arquivo: Option<PathBuf>,
    pub carregar: Option<String>,
    pub salvar: bool,
    pub armazem: PathBuf,
    pub opcoes: OpcoesIngestao,
    pub filtro: FiltroSelecao,
    pub prazos: Option<PathBuf>,
    pub motoristas: Option<PathBuf>,
    pub dia: FiltroDia,
    pub json: Option<PathBuf>,
    pub top: usize,
    pub clear: bool,
    pub verbose: bool,
}

pub fn get_config() -> AnaliseResult<Config> {
    let args = Arguments::parse();

    if args.lote == 0 {
        return Err(AnaliseError::Config("o tamanho do lote deve ser maior que zero".to_string()));
    }

    // Clap já exige um dos dois; este erro só ocorreria em casos extremos.
    if args.arquivo.is_none() && args.carregar.is_none() {
        return Err(AnaliseError::Config("informe --arquivo ou --carregar".to_string()));
    }

    let uf = match args.uf.trim() {
        u if u.is_empty() || u.eq_ignore_ascii_case("todas") => Selecao::Todas,
        u => Selecao::Apenas(u.to_uppercase()),
    };

    let dia = match (args.hoje, args.exceto_hoje) {
        (true, _) => FiltroDia::Hoje,
        (false, true) => FiltroDia::ExcetoHoje,
        (false, false) => FiltroDia::Todos,
    };

    let limpar = |lista: Vec<String>| lista.into_iter().map(|s| s.trim().to_string()).collect::<Vec<_>>();

    Ok(Config {
        arquivo: args.arquivo,
        carregar: args.carregar,
        salvar: args.salvar,
        armazem: args.armazem,
        opcoes: OpcoesIngestao {
            tamanho_lote: args.lote,
            tamanho_amostra: args.amostra,
        },
        filtro: FiltroSelecao {
            uf,
            unidades: Selecao::from_lista(Some(limpar(args.unidades))),
            codigos: Selecao::from_lista(Some(limpar(args.codigos))),
        },
        prazos: args.prazos,
        motoristas: args.motoristas,
        dia,
        json: args.json,
        top: args.top,
        clear: args.clear,
        verbose: args.verbose,
    })
}
