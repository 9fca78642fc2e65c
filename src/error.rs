use std::{io, path::PathBuf};
use thiserror::Error;

/// Tipo de retorno conveniente para todo o projeto
pub type AnaliseResult<T> = Result<T, AnaliseError>;

#[derive(Error, Debug)]
pub enum AnaliseError {
    #[error("Falha na comunicação com o agregador: {0}")]
    Agregador(String),

    #[error("Arquivo vazio: <{arquivo}> não contém dados para processar.")]
    ArquivoVazio { arquivo: String },

    #[error("O processamento do arquivo foi cancelado.")]
    Cancelado,

    #[error(
        "Arquivo tem apenas {encontradas} colunas e não contém a coluna <{coluna}>.\n\
        É necessário ter pelo menos {minimo} colunas."
    )]
    ColunaAlvoAusente {
        coluna: String,
        encontradas: usize,
        minimo: usize,
    },

    #[error(
        "Erro no número de colunas!\n\
        Arquivo: {arquivo}\n\
        Linha nº: {linha}\n\
        Esperado: {esperado} colunas\n\
        Encontrado: {encontrado} colunas"
    )]
    ColumnCount {
        arquivo: String,
        linha: usize,
        esperado: usize,
        encontrado: usize,
    },

    #[error("Erro de configuração: {0}")]
    Config(String),

    #[error("Erro no processamento CSV: {0}")]
    Csv(#[from] csv::Error),

    #[error("Os dados compartilhados estão corrompidos: {0}")]
    DadosCorrompidos(String),

    #[error("Formato inválido: <{arquivo}>. Envie apenas arquivos CSV, XLSX ou SSWWEB.")]
    ExtensaoInvalida { arquivo: String },

    #[error("Erro de I/O: {0}")]
    Io(#[from] io::Error),

    #[error(
        "Arquivo não encontrado!\n\
        Arquivo: {arquivo:?}\n\
        {source}"
    )]
    IoReader {
        #[source]
        source: io::Error,
        arquivo: PathBuf,
    },

    #[error("Erro de JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("O arquivo <{arquivo}> deve ter pelo menos {minimo} linhas.")]
    LinhasInsuficientes { arquivo: String, minimo: usize },

    #[error("Erro ao ler planilha XLSX: {0}")]
    Planilha(#[from] calamine::Error),

    #[error("Registro <{id}> não encontrado no armazenamento.")]
    RegistroNaoEncontrado { id: String },
}

impl AnaliseError {
    pub fn from_csv(e: csv::Error, arquivo: &str, linha: usize) -> Self {
        if let csv::ErrorKind::UnequalLengths {
            expected_len, len, ..
        } = e.kind()
        {
            return AnaliseError::ColumnCount {
                arquivo: arquivo.to_string(),
                linha,
                esperado: *expected_len as usize,
                encontrado: *len as usize,
            };
        }
        AnaliseError::Csv(e)
    }

    /// Título curto exibido ao usuário antes da explicação.
    pub fn titulo(&self) -> &'static str {
        match self {
            AnaliseError::Agregador(_) => "Erro ao processar dados",
            AnaliseError::ArquivoVazio { .. } => "Arquivo vazio",
            AnaliseError::Cancelado => "Processamento cancelado",
            AnaliseError::ColunaAlvoAusente { .. } | AnaliseError::ColumnCount { .. } => {
                "Erro na estrutura do arquivo"
            }
            AnaliseError::Config(_) => "Erro de configuração",
            AnaliseError::Csv(_) | AnaliseError::Planilha(_) => "Erro ao processar arquivo",
            AnaliseError::DadosCorrompidos(_) => "Erro ao descomprimir",
            AnaliseError::ExtensaoInvalida { .. } => "Formato inválido",
            AnaliseError::Io(_) | AnaliseError::IoReader { .. } => "Erro de leitura",
            AnaliseError::Json(_) => "Erro ao carregar dados",
            AnaliseError::LinhasInsuficientes { .. } => "Arquivo inválido",
            AnaliseError::RegistroNaoEncontrado { .. } => "Erro ao carregar dados",
        }
    }

    /// Cancelamento é uma terminação normal, não uma falha.
    pub fn is_cancelamento(&self) -> bool {
        matches!(self, AnaliseError::Cancelado)
    }
}
