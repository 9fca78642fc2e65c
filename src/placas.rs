//! Desempenho por veículo (placa): entregues, em rota e insucessos,
//! cada grupo detalhado por cidade com a lista de CTRCs.

use serde::Serialize;
use std::collections::BTreeMap;
use tracing::debug;

use crate::{
    CIDADE_NAO_INFORMADA, CODIGO_EM_ROTA, CODIGO_ENTREGUE, ConsultaMotorista, DadosProcessados,
    FiltroSelecao, filtrar, percentual,
};

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CidadePlaca {
    pub quantidade: usize,
    pub ctrcs: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct GrupoPlaca {
    pub quantidade: usize,
    /// Sobre o total da placa.
    pub percentual: f64,
    pub cidades: BTreeMap<String, CidadePlaca>,
}

impl GrupoPlaca {
    fn registrar(&mut self, cidade: &str, ctrc: &str) {
        self.quantidade += 1;
        let entrada = self.cidades.entry(cidade.to_string()).or_default();
        entrada.quantidade += 1;
        if !ctrc.is_empty() {
            entrada.ctrcs.push(ctrc.to_string());
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResumoPlaca {
    pub placa: String,
    pub motorista: String,
    /// UF e unidade da primeira linha da placa.
    pub uf: String,
    pub unidade: String,
    /// Todas as linhas da placa, inclusive as sem código.
    pub total: usize,
    pub entregues: GrupoPlaca,
    pub em_rota: GrupoPlaca,
    pub insucessos: GrupoPlaca,
    pub cidade_principal: String,
}

/// Classificação de um código para o resumo por placa. Código vazio não entra em grupo.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Situacao {
    Entregue,
    EmRota,
    Insucesso,
}

fn situacao(codigo: &str) -> Option<Situacao> {
    match codigo {
        "" => None,
        CODIGO_ENTREGUE => Some(Situacao::Entregue),
        c if c.eq_ignore_ascii_case("entregue") => Some(Situacao::Entregue),
        CODIGO_EM_ROTA => Some(Situacao::EmRota),
        _ => Some(Situacao::Insucesso),
    }
}

impl ResumoPlaca {
    fn new(placa: &str, uf: &str, unidade: &str) -> Self {
        ResumoPlaca {
            placa: placa.to_string(),
            motorista: String::new(),
            uf: uf.to_string(),
            unidade: unidade.to_string(),
            total: 0,
            entregues: GrupoPlaca::default(),
            em_rota: GrupoPlaca::default(),
            insucessos: GrupoPlaca::default(),
            cidade_principal: String::new(),
        }
    }

    fn grupos_mut(&mut self) -> [&mut GrupoPlaca; 3] {
        [&mut self.entregues, &mut self.em_rota, &mut self.insucessos]
    }

    fn finalizar(&mut self) {
        let total = self.total;
        for grupo in self.grupos_mut() {
            grupo.percentual = percentual(grupo.quantidade, total);
        }

        let mut por_cidade: BTreeMap<&str, usize> = BTreeMap::new();
        for grupo in [&self.entregues, &self.em_rota, &self.insucessos] {
            for (cidade, c) in &grupo.cidades {
                *por_cidade.entry(cidade).or_insert(0) += c.quantidade;
            }
        }

        // Empate: a primeira em ordem alfabética (BTreeMap já ordenado)
        self.cidade_principal = por_cidade
            .into_iter()
            .fold(None, |melhor: Option<(&str, usize)>, (cidade, qtd)| match melhor {
                Some((_, m)) if m >= qtd => melhor,
                _ => Some((cidade, qtd)),
            })
            .map(|(cidade, _)| cidade.to_string())
            .unwrap_or_else(|| "N/A".to_string());
    }
}

/// Resume cada placa do escopo do filtro. Ordenado por total decrescente e placa.
///
/// Sem colunas de placa ou de código, o resultado é vazio.
pub fn analisar_placas(
    dados: &DadosProcessados,
    filtro: &FiltroSelecao,
    motoristas: &dyn ConsultaMotorista,
) -> Vec<ResumoPlaca> {
    let colunas = &dados.colunas;
    let (Some(col_placa), Some(ocorrencia)) = (colunas.placa.as_ref(), colunas.ocorrencia.as_ref()) else {
        return Vec::new();
    };

    let mut placas: BTreeMap<String, ResumoPlaca> = BTreeMap::new();

    for linha in filtrar(&dados.completo, colunas, filtro) {
        let placa = linha.campo(col_placa);
        if placa.is_empty() {
            continue;
        }

        let resumo = placas.entry(placa.to_string()).or_insert_with(|| {
            ResumoPlaca::new(
                placa,
                linha.campo_opcional(colunas.uf.as_ref()),
                linha.campo_opcional(colunas.unidade.as_ref()),
            )
        });
        resumo.total += 1;

        let cidade = match linha.campo_opcional(colunas.cidade.as_ref()) {
            "" => CIDADE_NAO_INFORMADA,
            c => c,
        };
        let ctrc = linha.campo_opcional(colunas.ctrc.as_ref());

        match situacao(linha.campo(ocorrencia)) {
            Some(Situacao::Entregue) => resumo.entregues.registrar(cidade, ctrc),
            Some(Situacao::EmRota) => resumo.em_rota.registrar(cidade, ctrc),
            Some(Situacao::Insucesso) => resumo.insucessos.registrar(cidade, ctrc),
            None => {}
        }
    }

    let mut lista: Vec<ResumoPlaca> = placas
        .into_values()
        .map(|mut resumo| {
            resumo.motorista = motoristas.nome_motorista(&resumo.placa, &resumo.unidade);
            resumo.finalizar();
            resumo
        })
        .collect();

    lista.sort_by(|a, b| b.total.cmp(&a.total).then_with(|| a.placa.cmp(&b.placa)));
    debug!(placas = lista.len(), "resumo por placa");
    lista
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{COLUNA_ALVO, Cabecalho, Linha, ResultadoAgregacao, Selecao};
    use std::sync::Arc;

    fn dados(linhas: &[[&str; 5]]) -> DadosProcessados {
        let cab = Arc::new(Cabecalho::new(["CTRC", "Cidade de Entrega", "Unidade Receptora", COLUNA_ALVO, "Placa"]));
        let linhas = linhas
            .iter()
            .map(|v| Linha::new(cab.clone(), v.iter().map(|s| s.to_string()).collect()))
            .collect();
        DadosProcessados::new(linhas, ResultadoAgregacao::default(), COLUNA_ALVO.to_string(), 10)
    }

    fn motorista(placa: &str, _unidade: &str) -> String {
        format!("Motorista {placa}")
    }

    #[test]
    fn grupos_por_placa_e_cidade() {
        let d = dados(&[
            ["C1", "Gaspar", "BLU", "1", "AAA1111"],
            ["C2", "Gaspar", "BLU", "Entregue", "AAA1111"],
            ["C3", "Ilhota", "BLU", "59", "AAA1111"],
            ["C4", "", "BLU", "26", "AAA1111"],
            ["", "Ilhota", "BLU", "", "AAA1111"],
            ["C6", "Blumenau", "BRQ", "1", "BBB2222"],
            ["C7", "Blumenau", "BRQ", "1", ""],
        ]);

        let placas = analisar_placas(&d, &FiltroSelecao::default(), &motorista);
        assert_eq!(placas.len(), 2);

        let a = &placas[0];
        assert_eq!((a.placa.as_str(), a.total, a.unidade.as_str()), ("AAA1111", 5, "BLU"));
        assert_eq!(a.motorista, "Motorista AAA1111");
        assert_eq!(a.entregues.quantidade, 2);
        assert_eq!(a.entregues.percentual, 40.0);
        assert_eq!(a.entregues.cidades["Gaspar"].ctrcs, ["C1", "C2"]);
        assert_eq!(a.insucessos.cidades[CIDADE_NAO_INFORMADA].quantidade, 1);
        // Gaspar 2 x Ilhota 1 (a linha sem código não entra nos grupos)
        assert_eq!(a.cidade_principal, "Gaspar");

        assert_eq!(placas[1].entregues.percentual, 100.0);
    }

    #[test]
    fn empate_de_cidade_principal_em_ordem_alfabetica() {
        let d = dados(&[
            ["C1", "Navegantes", "ITJ", "1", "CCC3333"],
            ["C2", "Itajai", "ITJ", "26", "CCC3333"],
        ]);
        let placas = analisar_placas(&d, &FiltroSelecao::default(), &motorista);
        assert_eq!(placas[0].cidade_principal, "Itajai");
    }

    #[test]
    fn filtro_de_codigos_antes_dos_grupos() {
        let d = dados(&[
            ["C1", "Gaspar", "BLU", "1", "AAA1111"],
            ["C2", "Gaspar", "BLU", "26", "AAA1111"],
        ]);
        let filtro = FiltroSelecao {
            codigos: Selecao::from_lista(Some(["26"])),
            ..Default::default()
        };
        let placas = analisar_placas(&d, &filtro, &motorista);
        assert_eq!(placas[0].total, 1);
        assert_eq!(placas[0].insucessos.percentual, 100.0);
    }
}
