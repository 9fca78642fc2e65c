//! Compartilhamento de conjuntos processados: um registro chave-valor com as
//! linhas comprimidas (gzip + base64) e o resumo da agregação.

use base64::{
    Engine,
    engine::general_purpose::STANDARD,
    write::EncoderStringWriter,
};
use flate2::{Compression, read::GzDecoder, write::GzEncoder};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::{
    fs::{self, File},
    io::{BufReader, BufWriter, Read, Write},
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{debug, info, warn};

use crate::{
    AnaliseError, AnaliseResult, Cabecalho, DadosProcessados, Linha, ResultadoAgregacao,
    TAMANHO_AMOSTRA_PADRAO, TAMANHO_LOTE_PADRAO, TipoArquivo, agregar_em_lotes,
};

/// Janela de bytes comprimidos entregue de cada vez ao codificador base64.
const JANELA_BASE64: usize = 32 * 1024;

/// Chave, dentro de `metadata`, que indica `raw_data` comprimido.
const CHAVE_COMPRIMIDO: &str = "compressed";

/// Registro armazenado.
///
/// `raw_data` é uma string base64 (gzip de um array JSON de objetos) quando
/// `metadata.compressed` é verdadeiro, ou o próprio array no formato antigo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegistroCompartilhado {
    pub id: String,
    pub file_name: String,
    pub file_type: String,
    pub column_name: String,
    pub row_count: usize,
    pub metadata: Value,
    pub raw_data: Value,
}

impl RegistroCompartilhado {
    /// Empacota o conjunto. O id é o hash blake3 da carga comprimida.
    pub fn from_dados(
        dados: &DadosProcessados,
        file_name: &str,
        tipo: TipoArquivo,
    ) -> AnaliseResult<Self> {
        let carga = comprimir_linhas(&dados.completo)?;
        let id = blake3::hash(carga.as_bytes()).to_string();

        let mut metadata = serde_json::to_value(&dados.meta)?;
        if let Value::Object(mapa) = &mut metadata {
            mapa.insert(CHAVE_COMPRIMIDO.to_string(), Value::Bool(true));
        }

        info!(id = %id, linhas = dados.total_linhas(), bytes = carga.len(), "registro empacotado");

        Ok(RegistroCompartilhado {
            id,
            file_name: file_name.to_string(),
            file_type: tipo.as_str().to_string(),
            column_name: dados.coluna_alvo.clone(),
            row_count: dados.total_linhas(),
            metadata,
            raw_data: Value::String(carga),
        })
    }

    pub fn comprimido(&self) -> bool {
        self.metadata
            .get(CHAVE_COMPRIMIDO)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    /// Reconstrói o conjunto: linhas, amostra e resumo.
    ///
    /// O resumo armazenado é reaproveitado; se estiver ausente ou ilegível,
    /// é recalculado pelo agregador.
    pub fn into_dados(self) -> AnaliseResult<DadosProcessados> {
        let objetos = match (&self.raw_data, self.comprimido()) {
            (Value::String(carga), true) => descomprimir(carga)?,
            (Value::String(json), false) => serde_json::from_str(json)
                .map_err(|e| AnaliseError::DadosCorrompidos(e.to_string()))?,
            (Value::Array(_), _) => serde_json::from_value(self.raw_data.clone())
                .map_err(|e| AnaliseError::DadosCorrompidos(e.to_string()))?,
            _ => {
                return Err(AnaliseError::DadosCorrompidos(
                    "raw_data não é um array nem uma string".to_string(),
                ));
            }
        };

        let linhas = objetos_para_linhas(objetos);
        if linhas.len() != self.row_count {
            warn!(esperado = self.row_count, encontrado = linhas.len(), "quantidade de linhas difere do registro");
        }

        let (meta, linhas) = match resumo_armazenado(&self.metadata) {
            Some(meta) => (meta, linhas),
            None => {
                debug!(id = %self.id, "resumo ausente, recalculando");
                agregar_em_lotes(linhas, &self.column_name, TAMANHO_LOTE_PADRAO)?
            }
        };

        Ok(DadosProcessados::new(linhas, meta, self.column_name, TAMANHO_AMOSTRA_PADRAO))
    }
}

fn resumo_armazenado(metadata: &Value) -> Option<ResultadoAgregacao> {
    metadata.get("frequencyMap")?;
    serde_json::from_value(metadata.clone()).ok()
}

/// JSON das linhas -> gzip -> base64.
pub fn comprimir_linhas(linhas: &[Linha]) -> AnaliseResult<String> {
    let mut gz = GzEncoder::new(Vec::new(), Compression::default());
    serde_json::to_writer(&mut gz, linhas)?;
    let comprimido = gz.finish()?;

    let mut encoder = EncoderStringWriter::new(&STANDARD);
    for janela in comprimido.chunks(JANELA_BASE64) {
        encoder.write_all(janela)?;
    }
    Ok(encoder.into_inner())
}

/// Inverso de [`comprimir_linhas`]. Falhas viram [`AnaliseError::DadosCorrompidos`].
pub fn descomprimir(carga: &str) -> AnaliseResult<Vec<Map<String, Value>>> {
    let bytes = STANDARD
        .decode(carga.trim())
        .map_err(|e| AnaliseError::DadosCorrompidos(format!("base64 inválido: {e}")))?;

    let mut json = String::new();
    GzDecoder::new(bytes.as_slice())
        .read_to_string(&mut json)
        .map_err(|e| AnaliseError::DadosCorrompidos(format!("gzip inválido: {e}")))?;

    serde_json::from_str(&json).map_err(|e| AnaliseError::DadosCorrompidos(e.to_string()))
}

/// O cabeçalho vem das chaves do primeiro objeto (na ordem em que aparecem).
fn objetos_para_linhas(objetos: Vec<Map<String, Value>>) -> Vec<Linha> {
    let Some(primeiro) = objetos.first() else {
        return Vec::new();
    };
    let nomes: Vec<String> = primeiro.keys().cloned().collect();
    let cabecalho = Arc::new(Cabecalho::new(&nomes));

    objetos
        .into_iter()
        .map(|mut objeto| {
            let valores = nomes
                .iter()
                .map(|nome| objeto.remove(nome).map(valor_para_string).unwrap_or_default())
                .collect();
            Linha::new(cabecalho.clone(), valores)
        })
        .collect()
}

// Formato antigo: números e booleanos como texto, null como vazio.
fn valor_para_string(valor: Value) -> String {
    match valor {
        Value::Null => String::new(),
        Value::String(s) => s,
        outro => outro.to_string(),
    }
}

/// Armazenamento chave-valor de registros compartilhados.
pub trait ArmazemChaveValor {
    fn salvar(&self, registro: &RegistroCompartilhado) -> AnaliseResult<()>;
    fn carregar(&self, id: &str) -> AnaliseResult<RegistroCompartilhado>;
}

/// Um arquivo JSON por registro, em um diretório.
#[derive(Debug, Clone)]
pub struct ArmazemEmDiretorio {
    diretorio: PathBuf,
}

impl ArmazemEmDiretorio {
    pub fn new(diretorio: impl Into<PathBuf>) -> Self {
        ArmazemEmDiretorio {
            diretorio: diretorio.into(),
        }
    }

    pub fn diretorio(&self) -> &Path {
        &self.diretorio
    }

    fn caminho(&self, id: &str) -> AnaliseResult<PathBuf> {
        if id.is_empty() || !id.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(AnaliseError::RegistroNaoEncontrado { id: id.to_string() });
        }
        Ok(self.diretorio.join(format!("{id}.json")))
    }
}

impl ArmazemChaveValor for ArmazemEmDiretorio {
    fn salvar(&self, registro: &RegistroCompartilhado) -> AnaliseResult<()> {
        fs::create_dir_all(&self.diretorio)?;
        let caminho = self.caminho(&registro.id)?;
        let mut writer = BufWriter::new(File::create(&caminho)?);
        serde_json::to_writer(&mut writer, registro)?;
        writer.flush()?;
        info!(arquivo = %caminho.display(), "registro salvo");
        Ok(())
    }

    fn carregar(&self, id: &str) -> AnaliseResult<RegistroCompartilhado> {
        let caminho = self.caminho(id)?;
        if !caminho.exists() {
            return Err(AnaliseError::RegistroNaoEncontrado { id: id.to_string() });
        }
        let file = File::open(&caminho).map_err(|e| AnaliseError::IoReader {
            source: e,
            arquivo: caminho.clone(),
        })?;
        let registro = serde_json::from_reader(BufReader::new(file))?;
        Ok(registro)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{COLUNA_ALVO, reduce};
    use serde_json::json;

    fn dados() -> DadosProcessados {
        let cab = Arc::new(Cabecalho::new(["UF de Entrega", "Unidade Receptora", COLUNA_ALVO]));
        let linhas: Vec<Linha> = [["SP", "ABC", "1"], ["SP", "ABC", "59"], ["RJ", "XYZ", ""]]
            .iter()
            .map(|v| Linha::new(cab.clone(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        let meta = reduce(&linhas, COLUNA_ALVO);
        DadosProcessados::new(linhas, meta, COLUNA_ALVO.to_string(), 2)
    }

    #[test]
    fn compressao_reconstroi_as_linhas() {
        let original = dados();
        let registro = RegistroCompartilhado::from_dados(&original, "base.csv", TipoArquivo::Csv).unwrap();
        assert!(registro.comprimido());
        assert_eq!(registro.row_count, 3);
        assert_eq!(registro.file_type, "csv");

        let carregado = registro.into_dados().unwrap();
        assert_eq!(carregado.completo, original.completo);
        assert_eq!(carregado.meta, original.meta);
        assert_eq!(carregado.amostra.len(), 3);
    }

    #[test]
    fn formato_antigo_sem_compressao() {
        let registro = RegistroCompartilhado {
            id: "antigo".into(),
            file_name: "base.xlsx".into(),
            file_type: "xlsx".into(),
            column_name: COLUNA_ALVO.into(),
            row_count: 2,
            metadata: json!({}),
            raw_data: json!([
                {"UF de Entrega": "SP", COLUNA_ALVO: 1, "Peso": null},
                {"UF de Entrega": "RJ", COLUNA_ALVO: "26", "Peso": 2.5},
            ]),
        };

        let dados = registro.into_dados().unwrap();
        assert_eq!(dados.completo[0].valores(), ["SP", "1", ""]);
        assert_eq!(dados.completo[1].get("Peso"), Some("2.5"));
        // Resumo recalculado pelo agregador
        assert_eq!(dados.meta.frequencia["1"], 1);
        assert_eq!(dados.meta.total_processado, 2);
    }

    #[test]
    fn carga_corrompida() {
        let mut registro = RegistroCompartilhado::from_dados(&dados(), "base.csv", TipoArquivo::Csv).unwrap();
        registro.raw_data = Value::String("H4sI-isto-nao-e-gzip".into());
        let erro = registro.into_dados().unwrap_err();
        assert!(matches!(erro, AnaliseError::DadosCorrompidos(_)));
        assert_eq!(erro.titulo(), "Erro ao descomprimir");
    }

    #[test]
    fn armazem_em_diretorio() {
        let dir = tempfile::tempdir().unwrap();
        let armazem = ArmazemEmDiretorio::new(dir.path().join("registros"));

        let registro = RegistroCompartilhado::from_dados(&dados(), "base.csv", TipoArquivo::Csv).unwrap();
        armazem.salvar(&registro).unwrap();
        assert_eq!(armazem.carregar(&registro.id).unwrap(), registro);

        let erro = armazem.carregar("inexistente").unwrap_err();
        assert!(matches!(erro, AnaliseError::RegistroNaoEncontrado { .. }));
        assert!(armazem.carregar("../fora").is_err());
    }
}
