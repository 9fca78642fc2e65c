use serde::{Serialize, Serializer, ser::SerializeMap};
use std::{collections::HashMap, sync::Arc};

use crate::{COLUNA_ALVO, Coluna, ColunasResolvidas, OrigemColuna, ResultadoAgregacao};

/// Nomes das colunas de um conjunto de dados, compartilhados por todas as linhas.
///
/// Nomes repetidos recebem os sufixos `_1`, `_2`, ... para que cada chave seja única.
///
/// ```
/// use analise_ocorrencias::Cabecalho;
///
/// let cab = Cabecalho::new(["Placa", "Data", "Placa", "Placa"]);
/// assert_eq!(cab.nomes(), ["Placa", "Data", "Placa_1", "Placa_2"]);
/// assert_eq!(cab.posicao("Placa_1"), Some(2));
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Cabecalho {
    nomes: Vec<String>,
    indices: HashMap<String, usize>,
}

impl Cabecalho {
    pub fn new<I, S>(nomes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut cabecalho = Cabecalho::default();

        for nome in nomes {
            let base = nome.as_ref().trim();
            let mut candidato = base.to_string();
            let mut sufixo = 0;
            while cabecalho.indices.contains_key(&candidato) {
                sufixo += 1;
                candidato = format!("{base}_{sufixo}");
            }
            cabecalho.indices.insert(candidato.clone(), cabecalho.nomes.len());
            cabecalho.nomes.push(candidato);
        }

        cabecalho
    }

    pub fn nomes(&self) -> &[String] {
        &self.nomes
    }

    pub fn posicao(&self, nome: &str) -> Option<usize> {
        self.indices.get(nome).copied()
    }

    pub fn len(&self) -> usize {
        self.nomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nomes.is_empty()
    }
}

/// Um registro de remessa: valores alinhados com o cabeçalho compartilhado.
///
/// Todas as linhas de um conjunto apontam para o mesmo `Arc<Cabecalho>`,
/// logo possuem exatamente o mesmo conjunto de chaves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Linha {
    cabecalho: Arc<Cabecalho>,
    valores: Vec<String>,
}

impl Linha {
    /// Valores faltantes viram string vazia e excedentes são descartados.
    pub fn new(cabecalho: Arc<Cabecalho>, mut valores: Vec<String>) -> Self {
        valores.resize(cabecalho.len(), String::new());
        Linha { cabecalho, valores }
    }

    pub fn get(&self, nome: &str) -> Option<&str> {
        self.cabecalho
            .posicao(nome)
            .and_then(|i| self.valores.get(i))
            .map(String::as_str)
    }

    /// Valor na posição indicada, ou `""` fora do intervalo.
    pub fn valor(&self, indice: usize) -> &str {
        self.valores.get(indice).map(String::as_str).unwrap_or_default()
    }

    /// Valor da coluna resolvida, sem espaços nas bordas.
    pub fn campo(&self, coluna: &Coluna) -> &str {
        self.valor(coluna.indice).trim()
    }

    /// Como [`Linha::campo`], aceitando uma coluna não resolvida.
    pub fn campo_opcional(&self, coluna: Option<&Coluna>) -> &str {
        coluna.map(|c| self.campo(c)).unwrap_or_default()
    }

    pub fn valores(&self) -> &[String] {
        &self.valores
    }

    pub fn cabecalho(&self) -> &Arc<Cabecalho> {
        &self.cabecalho
    }
}

// Serializa como objeto JSON {coluna: valor}, na ordem do cabeçalho.
impl Serialize for Linha {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.valores.len()))?;
        for (nome, valor) in self.cabecalho.nomes().iter().zip(&self.valores) {
            map.serialize_entry(nome, valor)?;
        }
        map.end()
    }
}

/// Resultado de uma carga (upload ou registro compartilhado).
///
/// Criado uma vez e substituído por inteiro ao trocar de arquivo;
/// filtros produzem novas estruturas e nunca alteram este valor.
#[derive(Debug, Clone)]
pub struct DadosProcessados {
    /// Primeiras linhas, para exibição.
    pub amostra: Vec<Linha>,
    pub completo: Vec<Linha>,
    pub meta: ResultadoAgregacao,
    pub colunas: ColunasResolvidas,
    pub coluna_alvo: String,
}

impl DadosProcessados {
    pub fn new(
        completo: Vec<Linha>,
        meta: ResultadoAgregacao,
        coluna_alvo: String,
        tamanho_amostra: usize,
    ) -> Self {
        let mut colunas = completo
            .first()
            .map(|l| ColunasResolvidas::resolver(l.cabecalho().nomes()))
            .unwrap_or_default();

        // As métricas leem o código na mesma coluna usada pela agregação
        if let Some(indice) = completo.first().and_then(|l| l.cabecalho().posicao(&coluna_alvo)) {
            colunas.ocorrencia = Some(Coluna {
                nome: coluna_alvo.clone(),
                indice,
                origem: if coluna_alvo == COLUNA_ALVO {
                    OrigemColuna::Nome
                } else {
                    OrigemColuna::Posicao
                },
            });
        }
        let amostra = completo.iter().take(tamanho_amostra).cloned().collect();

        DadosProcessados {
            amostra,
            completo,
            meta,
            colunas,
            coluna_alvo,
        }
    }

    pub fn total_linhas(&self) -> usize {
        self.completo.len()
    }

    pub fn cabecalho(&self) -> Option<&Arc<Cabecalho>> {
        self.completo.first().map(Linha::cabecalho)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn linha_completa_valores_faltantes() {
        let cab = Arc::new(Cabecalho::new(["A", "B", "C"]));
        let linha = Linha::new(cab, vec!["1".into()]);
        assert_eq!(linha.valores(), ["1", "", ""]);
        assert_eq!(linha.get("B"), Some(""));
        assert_eq!(linha.get("Z"), None);
        assert_eq!(linha.valor(10), "");
    }

    #[test]
    fn serializa_como_objeto() {
        let cab = Arc::new(Cabecalho::new(["A", "A"]));
        let linha = Linha::new(cab, vec!["x".into(), "y".into()]);
        let json = serde_json::to_string(&linha).unwrap();
        assert_eq!(json, r#"{"A":"x","A_1":"y"}"#);
    }
}
