//! Resolução das colunas semânticas de um conjunto de dados.
//!
//! Cada campo tem uma lista ordenada de padrões (do mais específico ao mais genérico).
//! Um padrão é um conjunto de fragmentos que devem aparecer, todos, no nome normalizado
//! da coluna. Se nenhum cabeçalho corresponder, usa-se a posição fixa do leiaute.

use serde::Serialize;
use std::fmt;
use tracing::debug;
use unicode_normalization::{UnicodeNormalization, char::is_combining_mark};

use crate::{
    AnaliseError, AnaliseResult, COLUNA_ALVO, POSICAO_CIDADE, POSICAO_COLUNA_ALVO, POSICAO_CTRC,
    POSICAO_DATA_ULTIMA_OCORRENCIA, POSICAO_PLACA, POSICAO_PREVISAO_ENTREGA, POSICAO_UF,
    POSICAO_ULTIMO_MANIFESTO, POSICAO_UNIDADE, RE_MULTISPACE,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum CampoSemantico {
    Cidade,
    Unidade,
    Uf,
    Ocorrencia,
    PrevisaoEntrega,
    UltimoManifesto,
    Ctrc,
    Placa,
    DataUltimaOcorrencia,
}

impl CampoSemantico {
    pub const TODOS: [CampoSemantico; 9] = [
        CampoSemantico::Cidade,
        CampoSemantico::Unidade,
        CampoSemantico::Uf,
        CampoSemantico::Ocorrencia,
        CampoSemantico::PrevisaoEntrega,
        CampoSemantico::UltimoManifesto,
        CampoSemantico::Ctrc,
        CampoSemantico::Placa,
        CampoSemantico::DataUltimaOcorrencia,
    ];

    /// Padrões (já normalizados) em ordem de prioridade.
    fn padroes(self) -> &'static [&'static [&'static str]] {
        match self {
            CampoSemantico::Cidade => &[&["cidade", "entrega"], &["cidade", "destinatario"], &["cidade"]],
            CampoSemantico::Unidade => &[&["unidade", "receptora"], &["unidade"]],
            CampoSemantico::Uf => &[&["uf", "entrega"], &["uf", "destinatario"], &["uf"]],
            CampoSemantico::Ocorrencia => &[
                &["codigo", "da", "ultima", "ocorrencia"],
                &["codigo", "ultima", "ocorrencia"],
                &["codigo", "ocorrencia"],
            ],
            CampoSemantico::PrevisaoEntrega => &[&["previsao", "entrega"], &["previsao"]],
            CampoSemantico::UltimoManifesto => {
                &[&["data", "ultimo", "manifesto"], &["ultimo", "manifesto"]]
            }
            CampoSemantico::Ctrc => &[&["serie", "numero", "ctrc"], &["numero", "ctrc"], &["ctrc"]],
            CampoSemantico::Placa => &[&["placa"]],
            CampoSemantico::DataUltimaOcorrencia => &[&["data", "ultima", "ocorrencia"]],
        }
    }

    /// Posição fixa (0-based) no leiaute de exportação.
    pub fn posicao(self) -> usize {
        match self {
            CampoSemantico::Cidade => POSICAO_CIDADE,
            CampoSemantico::Unidade => POSICAO_UNIDADE,
            CampoSemantico::Uf => POSICAO_UF,
            CampoSemantico::Ocorrencia => POSICAO_COLUNA_ALVO,
            CampoSemantico::PrevisaoEntrega => POSICAO_PREVISAO_ENTREGA,
            CampoSemantico::UltimoManifesto => POSICAO_ULTIMO_MANIFESTO,
            CampoSemantico::Ctrc => POSICAO_CTRC,
            CampoSemantico::Placa => POSICAO_PLACA,
            CampoSemantico::DataUltimaOcorrencia => POSICAO_DATA_ULTIMA_OCORRENCIA,
        }
    }
}

impl fmt::Display for CampoSemantico {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let nome = match self {
            CampoSemantico::Cidade => "cidade",
            CampoSemantico::Unidade => "unidade",
            CampoSemantico::Uf => "uf",
            CampoSemantico::Ocorrencia => "ocorrência",
            CampoSemantico::PrevisaoEntrega => "previsão de entrega",
            CampoSemantico::UltimoManifesto => "último manifesto",
            CampoSemantico::Ctrc => "ctrc",
            CampoSemantico::Placa => "placa",
            CampoSemantico::DataUltimaOcorrencia => "data da última ocorrência",
        };
        write!(f, "{nome}")
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OrigemColuna {
    Nome,
    Posicao,
}

/// Coluna concreta escolhida para um campo: nome da chave e índice no cabeçalho.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Coluna {
    pub nome: String,
    pub indice: usize,
    pub origem: OrigemColuna,
}

/// Snapshot imutável das colunas resolvidas de um conjunto de dados.
///
/// Qualquer campo pode ser `None`: quem consome deve verificar antes de usar.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ColunasResolvidas {
    pub cidade: Option<Coluna>,
    pub unidade: Option<Coluna>,
    pub uf: Option<Coluna>,
    pub ocorrencia: Option<Coluna>,
    pub previsao_entrega: Option<Coluna>,
    pub ultimo_manifesto: Option<Coluna>,
    pub ctrc: Option<Coluna>,
    pub placa: Option<Coluna>,
    pub data_ultima_ocorrencia: Option<Coluna>,
}

impl ColunasResolvidas {
    /// Resolve todos os campos a partir dos nomes do cabeçalho. Nunca falha.
    ///
    /// ```
    /// use analise_ocorrencias::{ColunasResolvidas, OrigemColuna};
    ///
    /// let cols = ColunasResolvidas::resolver(&["CTRC", "Cidade de Entrega", "Unidade Receptora"]);
    /// let cidade = cols.cidade.unwrap();
    /// assert_eq!((cidade.nome.as_str(), cidade.indice), ("Cidade de Entrega", 1));
    /// assert_eq!(cidade.origem, OrigemColuna::Nome);
    /// assert!(cols.placa.is_none());
    /// ```
    pub fn resolver<S: AsRef<str>>(cabecalhos: &[S]) -> Self {
        let normalizados: Vec<String> = cabecalhos.iter().map(|c| normalizar(c.as_ref())).collect();

        let mut resolvidas = ColunasResolvidas::default();
        for campo in CampoSemantico::TODOS {
            let coluna = resolver_campo(campo, cabecalhos, &normalizados);
            match &coluna {
                Some(c) => debug!(%campo, coluna = %c.nome, indice = c.indice, origem = ?c.origem, "coluna resolvida"),
                None => debug!(%campo, "coluna não resolvida"),
            }
            *resolvidas.campo_mut(campo) = coluna;
        }
        resolvidas
    }

    pub fn get(&self, campo: CampoSemantico) -> Option<&Coluna> {
        match campo {
            CampoSemantico::Cidade => self.cidade.as_ref(),
            CampoSemantico::Unidade => self.unidade.as_ref(),
            CampoSemantico::Uf => self.uf.as_ref(),
            CampoSemantico::Ocorrencia => self.ocorrencia.as_ref(),
            CampoSemantico::PrevisaoEntrega => self.previsao_entrega.as_ref(),
            CampoSemantico::UltimoManifesto => self.ultimo_manifesto.as_ref(),
            CampoSemantico::Ctrc => self.ctrc.as_ref(),
            CampoSemantico::Placa => self.placa.as_ref(),
            CampoSemantico::DataUltimaOcorrencia => self.data_ultima_ocorrencia.as_ref(),
        }
    }

    fn campo_mut(&mut self, campo: CampoSemantico) -> &mut Option<Coluna> {
        match campo {
            CampoSemantico::Cidade => &mut self.cidade,
            CampoSemantico::Unidade => &mut self.unidade,
            CampoSemantico::Uf => &mut self.uf,
            CampoSemantico::Ocorrencia => &mut self.ocorrencia,
            CampoSemantico::PrevisaoEntrega => &mut self.previsao_entrega,
            CampoSemantico::UltimoManifesto => &mut self.ultimo_manifesto,
            CampoSemantico::Ctrc => &mut self.ctrc,
            CampoSemantico::Placa => &mut self.placa,
            CampoSemantico::DataUltimaOcorrencia => &mut self.data_ultima_ocorrencia,
        }
    }
}

fn resolver_campo<S: AsRef<str>>(
    campo: CampoSemantico,
    cabecalhos: &[S],
    normalizados: &[String],
) -> Option<Coluna> {
    // Por nome: o primeiro padrão que encontra algum cabeçalho vence
    let por_nome = campo.padroes().iter().find_map(|fragmentos| {
        normalizados
            .iter()
            .position(|nome| fragmentos.iter().all(|f| nome.contains(f)))
    });

    let (indice, origem) = match por_nome {
        Some(i) => (i, OrigemColuna::Nome),
        None if cabecalhos.len() > campo.posicao() => (campo.posicao(), OrigemColuna::Posicao),
        None => return None,
    };

    Some(Coluna {
        nome: cabecalhos[indice].as_ref().to_string(),
        indice,
        origem,
    })
}

/// Coluna dos códigos de ocorrência usada pela agregação:
/// nome exato ou, na ausência, a 33ª coluna.
///
/// ```
/// use analise_ocorrencias::resolver_coluna_alvo;
///
/// let erro = resolver_coluna_alvo(&["A", "B", "C"]).unwrap_err();
/// assert!(erro.to_string().contains("pelo menos 33 colunas"));
/// ```
pub fn resolver_coluna_alvo<S: AsRef<str>>(cabecalhos: &[S]) -> AnaliseResult<Coluna> {
    if let Some(indice) = cabecalhos.iter().position(|c| c.as_ref() == COLUNA_ALVO) {
        return Ok(Coluna {
            nome: COLUNA_ALVO.to_string(),
            indice,
            origem: OrigemColuna::Nome,
        });
    }

    match cabecalhos.get(POSICAO_COLUNA_ALVO) {
        Some(nome) => Ok(Coluna {
            nome: nome.as_ref().to_string(),
            indice: POSICAO_COLUNA_ALVO,
            origem: OrigemColuna::Posicao,
        }),
        None => Err(AnaliseError::ColunaAlvoAusente {
            coluna: COLUNA_ALVO.to_string(),
            encontradas: cabecalhos.len(),
            minimo: POSICAO_COLUNA_ALVO + 1,
        }),
    }
}

/// Minúsculas, sem acentos e com espaços colapsados.
///
/// ```
/// use analise_ocorrencias::normalizar;
/// assert_eq!(normalizar("  Previsão  de ENTREGA "), "previsao de entrega");
/// ```
pub fn normalizar(texto: &str) -> String {
    let sem_acento: String = texto
        .nfd()
        .filter(|c| !is_combining_mark(*c))
        .collect::<String>()
        .to_lowercase();
    RE_MULTISPACE.replace_all(sem_acento.trim(), " ").into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cabecalho_posicional(tamanho: usize) -> Vec<String> {
        (0..tamanho).map(|i| format!("Col{i}")).collect()
    }

    #[test]
    fn padrao_mais_especifico_vence() {
        let cols = ColunasResolvidas::resolver(&[
            "Cidade",
            "Cidade do Destinatário",
            "Cidade de Entrega",
            "UF",
            "UF de Entrega",
        ]);
        assert_eq!(cols.cidade.unwrap().indice, 2);
        assert_eq!(cols.uf.unwrap().indice, 4);
    }

    #[test]
    fn acentos_e_caixa_sao_ignorados() {
        let cols = ColunasResolvidas::resolver(&[
            "PREVISÃO DE ENTREGA",
            "Data do Último Manifesto",
            "Série/Número CTRC",
            "Placa de Entrega",
            "Código da Última Ocorrência",
            "Data da Última Ocorrência",
        ]);
        assert_eq!(cols.previsao_entrega.unwrap().indice, 0);
        assert_eq!(cols.ultimo_manifesto.unwrap().indice, 1);
        assert_eq!(cols.ctrc.unwrap().indice, 2);
        assert_eq!(cols.placa.unwrap().indice, 3);
        assert_eq!(cols.ocorrencia.unwrap().indice, 4);
        assert_eq!(cols.data_ultima_ocorrencia.unwrap().indice, 5);
    }

    #[test]
    fn cidade_renomeada_usa_posicao_49() {
        let mut cabecalhos = cabecalho_posicional(100);
        cabecalhos[49] = "Municipio".to_string();

        let cols = ColunasResolvidas::resolver(&cabecalhos);
        let cidade = cols.get(CampoSemantico::Cidade).unwrap();
        assert_eq!(cidade.indice, 49);
        assert_eq!(cidade.nome, "Municipio");
        assert_eq!(cidade.origem, OrigemColuna::Posicao);
        assert_eq!(cols.unidade.unwrap().indice, 52);
        assert_eq!(cols.uf.unwrap().indice, 50);
        assert_eq!(cols.placa.unwrap().indice, 90);
    }

    #[test]
    fn cabecalho_curto_deixa_campos_sem_resolucao() {
        let cols = ColunasResolvidas::resolver(&cabecalho_posicional(10));
        assert!(cols.cidade.is_none());
        assert!(cols.previsao_entrega.is_none());
        // CTRC tem posição 1
        assert_eq!(cols.ctrc.unwrap().origem, OrigemColuna::Posicao);
    }

    #[test]
    fn coluna_alvo_por_nome_ou_posicao() {
        let alvo = resolver_coluna_alvo(&["X", COLUNA_ALVO]).unwrap();
        assert_eq!((alvo.indice, alvo.origem), (1, OrigemColuna::Nome));

        let cabecalhos = cabecalho_posicional(33);
        let alvo = resolver_coluna_alvo(&cabecalhos).unwrap();
        assert_eq!((alvo.nome.as_str(), alvo.indice), ("Col32", 32));

        let erro = resolver_coluna_alvo(&cabecalho_posicional(32)).unwrap_err();
        assert!(matches!(
            erro,
            AnaliseError::ColunaAlvoAusente { encontradas: 32, minimo: 33, .. }
        ));
    }
}
