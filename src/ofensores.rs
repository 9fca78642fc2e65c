//! Ranking de ofensores: qualquer código preenchido diferente de entregue (1)
//! e em rota (59) é uma falha. Ranqueia por código, por unidade e por
//! (motorista, placa).

use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};

use crate::{
    CIDADE_NAO_INFORMADA, ConsultaMotorista, DadosProcessados, FiltroSelecao, Selecao, eh_falha,
    filtrar_por_local, get_status_ocorrencia, percentual,
};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfensorCodigo {
    pub codigo: String,
    pub descricao: &'static str,
    pub quantidade: usize,
    pub percentual: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfensorUnidade {
    pub unidade: String,
    pub quantidade: usize,
    pub percentual: f64,
    /// motorista -> falhas
    pub motoristas: BTreeMap<String, usize>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OfensorMotorista {
    pub motorista: String,
    pub placa: String,
    pub unidade: String,
    pub quantidade: usize,
    pub percentual: f64,
    /// cidade -> falhas
    pub cidades: BTreeMap<String, usize>,
}

// Uma falha já resolvida, guardada para refazer o ranking com outros códigos.
#[derive(Debug, Clone, PartialEq, Eq)]
struct Falha {
    codigo: String,
    unidade: String,
    cidade: String,
    /// (motorista, placa), quando a linha tem placa e unidade.
    motorista: Option<(String, String)>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RankingOfensores {
    pub total_insucessos: usize,
    /// Linhas no escopo do filtro.
    pub total_linhas: usize,
    pub percentual_insucesso: f64,
    pub codigos: Vec<OfensorCodigo>,
    pub unidades: Vec<OfensorUnidade>,
    pub motoristas: Vec<OfensorMotorista>,
    pub total_unidades: usize,
    pub total_motoristas: usize,
    #[serde(skip)]
    falhas: Vec<Falha>,
}

/// Ranking sobre as linhas da UF e das unidades do filtro.
pub fn ranking_ofensores(
    dados: &DadosProcessados,
    filtro: &FiltroSelecao,
    motoristas: &dyn ConsultaMotorista,
) -> RankingOfensores {
    let colunas = &dados.colunas;
    let Some(ocorrencia) = colunas.ocorrencia.as_ref() else {
        return RankingOfensores::default();
    };

    let linhas = filtrar_por_local(&dados.completo, colunas, filtro);
    let total_linhas = linhas.len();

    // Cache: a mesma placa aparece em muitas linhas
    let mut nomes: BTreeMap<(String, String), String> = BTreeMap::new();

    let falhas = linhas
        .into_iter()
        .filter(|l| eh_falha(l.campo(ocorrencia)))
        .map(|l| {
            let unidade = l.campo_opcional(colunas.unidade.as_ref());
            let placa = l.campo_opcional(colunas.placa.as_ref());
            let cidade = match l.campo_opcional(colunas.cidade.as_ref()) {
                "" => CIDADE_NAO_INFORMADA,
                c => c,
            };

            let motorista = (!placa.is_empty() && !unidade.is_empty()).then(|| {
                let nome = nomes
                    .entry((placa.to_string(), unidade.to_string()))
                    .or_insert_with(|| motoristas.nome_motorista(placa, unidade))
                    .clone();
                (nome, placa.to_string())
            });

            Falha {
                codigo: l.campo(ocorrencia).to_string(),
                unidade: unidade.to_string(),
                cidade: cidade.to_string(),
                motorista,
            }
        })
        .collect();

    RankingOfensores::montar(falhas, total_linhas)
}

impl RankingOfensores {
    fn montar(falhas: Vec<Falha>, total_linhas: usize) -> Self {
        let total = falhas.len();

        let mut codigos: BTreeMap<&str, usize> = BTreeMap::new();
        let mut unidades: BTreeMap<&str, (usize, BTreeMap<String, usize>)> = BTreeMap::new();
        let mut motoristas: BTreeMap<(&str, &str), (&str, usize, BTreeMap<String, usize>)> = BTreeMap::new();

        for falha in &falhas {
            *codigos.entry(falha.codigo.as_str()).or_insert(0) += 1;

            let nome = falha.motorista.as_ref().map(|(nome, _)| nome.as_str());

            if !falha.unidade.is_empty() {
                let (qtd, por_motorista) = unidades.entry(falha.unidade.as_str()).or_default();
                *qtd += 1;
                if let Some(nome) = nome {
                    *por_motorista.entry(nome.to_string()).or_insert(0) += 1;
                }
            }

            if let Some((nome, placa)) = &falha.motorista {
                let (_, qtd, cidades) = motoristas
                    .entry((nome.as_str(), placa.as_str()))
                    .or_insert_with(|| (falha.unidade.as_str(), 0, BTreeMap::new()));
                *qtd += 1;
                *cidades.entry(falha.cidade.clone()).or_insert(0) += 1;
            }
        }

        let mut lista_codigos: Vec<OfensorCodigo> = codigos
            .into_iter()
            .map(|(codigo, quantidade)| OfensorCodigo {
                codigo: codigo.to_string(),
                descricao: get_status_ocorrencia(codigo),
                quantidade,
                percentual: percentual(quantidade, total),
            })
            .collect();
        lista_codigos.sort_by(|a, b| b.quantidade.cmp(&a.quantidade).then_with(|| a.codigo.cmp(&b.codigo)));

        let mut lista_unidades: Vec<OfensorUnidade> = unidades
            .into_iter()
            .map(|(unidade, (quantidade, motoristas))| OfensorUnidade {
                unidade: unidade.to_string(),
                quantidade,
                percentual: percentual(quantidade, total),
                motoristas,
            })
            .collect();
        lista_unidades.sort_by(|a, b| b.quantidade.cmp(&a.quantidade).then_with(|| a.unidade.cmp(&b.unidade)));

        let mut lista_motoristas: Vec<OfensorMotorista> = motoristas
            .into_iter()
            .map(|((motorista, placa), (unidade, quantidade, cidades))| OfensorMotorista {
                motorista: motorista.to_string(),
                placa: placa.to_string(),
                unidade: unidade.to_string(),
                quantidade,
                percentual: percentual(quantidade, total),
                cidades,
            })
            .collect();
        lista_motoristas.sort_by(|a, b| {
            b.quantidade
                .cmp(&a.quantidade)
                .then_with(|| a.motorista.cmp(&b.motorista))
                .then_with(|| a.placa.cmp(&b.placa))
        });

        RankingOfensores {
            total_insucessos: total,
            total_linhas,
            percentual_insucesso: percentual(total, total_linhas),
            total_unidades: lista_unidades.len(),
            total_motoristas: lista_motoristas.len(),
            codigos: lista_codigos,
            unidades: lista_unidades,
            motoristas: lista_motoristas,
            falhas,
        }
    }

    /// Refaz o ranking considerando apenas os códigos escolhidos.
    /// O total de linhas do escopo é mantido.
    ///
    /// `Todas` devolve uma cópia do ranking completo.
    pub fn selecionar_codigos(&self, codigos: &Selecao<BTreeSet<String>>) -> RankingOfensores {
        let falhas = self
            .falhas
            .iter()
            .filter(|f| codigos.aceita(&f.codigo))
            .cloned()
            .collect();
        RankingOfensores::montar(falhas, self.total_linhas)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{CODIGOS_OFENSORES_PADRAO, COLUNA_ALVO, Cabecalho, Linha, ResultadoAgregacao};
    use std::sync::Arc;

    fn dados(linhas: &[[&str; 4]]) -> DadosProcessados {
        let cab = Arc::new(Cabecalho::new(["Cidade de Entrega", "Unidade Receptora", COLUNA_ALVO, "Placa"]));
        let linhas = linhas
            .iter()
            .map(|v| Linha::new(cab.clone(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        DadosProcessados::new(linhas, ResultadoAgregacao::default(), COLUNA_ALVO.to_string(), 10)
    }

    fn motorista(placa: &str, _: &str) -> String {
        match placa {
            "AAA1111" => "Fulano".to_string(),
            _ => "Beltrano".to_string(),
        }
    }

    fn exemplo() -> DadosProcessados {
        dados(&[
            ["Gaspar", "BLU", "1", "AAA1111"],
            ["Gaspar", "BLU", "59", "AAA1111"],
            ["Gaspar", "BLU", "26", "AAA1111"],
            ["Ilhota", "BLU", "26", "AAA1111"],
            ["Ilhota", "BLU", "18", "BBB2222"],
            ["", "JOI", "999", ""],
            ["Joinville", "JOI", "", "CCC3333"],
        ])
    }

    #[test]
    fn ranking_por_codigo_unidade_e_motorista() {
        let r = ranking_ofensores(&exemplo(), &FiltroSelecao::default(), &motorista);

        assert_eq!(r.total_insucessos, 4);
        assert_eq!(r.total_linhas, 7);
        assert_eq!(r.codigos[0].codigo, "26");
        assert_eq!(r.codigos[0].percentual, 50.0);
        assert_eq!(r.codigos[0].descricao, "Insucesso");

        assert_eq!(r.total_unidades, 2);
        assert_eq!(r.unidades[0].unidade, "BLU");
        assert_eq!(r.unidades[0].motoristas["Fulano"], 2);

        // Linha sem placa não gera motorista
        assert_eq!(r.total_motoristas, 2);
        let fulano = &r.motoristas[0];
        assert_eq!((fulano.motorista.as_str(), fulano.placa.as_str()), ("Fulano", "AAA1111"));
        assert_eq!(fulano.cidades["Gaspar"], 1);
        assert_eq!(fulano.cidades["Ilhota"], 1);
    }

    #[test]
    fn selecao_de_codigos_refaz_totais() {
        let r = ranking_ofensores(&exemplo(), &FiltroSelecao::default(), &motorista);
        let sel = Selecao::from_lista(Some(CODIGOS_OFENSORES_PADRAO));
        let r = r.selecionar_codigos(&sel);

        // 999 não faz parte dos códigos padrão
        assert_eq!(r.total_insucessos, 3);
        assert_eq!(r.total_linhas, 7);
        assert_eq!(r.total_unidades, 1);
        assert!((r.codigos[0].percentual - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn sem_coluna_de_codigo() {
        let mut d = exemplo();
        d.colunas.ocorrencia = None;
        assert_eq!(ranking_ofensores(&d, &FiltroSelecao::default(), &motorista), RankingOfensores::default());
    }
}
