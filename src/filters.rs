use serde::Serialize;
use std::collections::BTreeSet;

use crate::{CODIGOS_SELECIONADOS_PADRAO, ColunasResolvidas, Linha, ResultadoAgregacao};

/// Uma escolha que pode ser "todas" ou um valor específico.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub enum Selecao<T> {
    #[default]
    Todas,
    Apenas(T),
}

impl<T> Selecao<T> {
    pub fn is_todas(&self) -> bool {
        matches!(self, Selecao::Todas)
    }

    pub fn valor(&self) -> Option<&T> {
        match self {
            Selecao::Todas => None,
            Selecao::Apenas(v) => Some(v),
        }
    }
}

impl Selecao<String> {
    pub fn aceita(&self, valor: &str) -> bool {
        match self {
            Selecao::Todas => true,
            Selecao::Apenas(v) => v == valor,
        }
    }
}

impl Selecao<BTreeSet<String>> {
    pub fn aceita(&self, valor: &str) -> bool {
        match self {
            Selecao::Todas => true,
            Selecao::Apenas(conjunto) => conjunto.contains(valor),
        }
    }

    /// `Todas` para `None` ou lista vazia.
    pub fn from_lista<I, S>(itens: Option<I>) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let conjunto: BTreeSet<String> = itens
            .into_iter()
            .flatten()
            .map(Into::into)
            .filter(|s: &String| !s.is_empty())
            .collect();

        if conjunto.is_empty() {
            Selecao::Todas
        } else {
            Selecao::Apenas(conjunto)
        }
    }
}

/// Filtro corrente: UF, conjunto de unidades e conjunto de códigos (combinados com E).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct FiltroSelecao {
    pub uf: Selecao<String>,
    pub unidades: Selecao<BTreeSet<String>>,
    pub codigos: Selecao<BTreeSet<String>>,
}

impl FiltroSelecao {
    /// Mesmo filtro, restrito a uma única unidade.
    pub fn com_unidade(&self, unidade: &str) -> FiltroSelecao {
        FiltroSelecao {
            unidades: Selecao::Apenas(BTreeSet::from([unidade.to_string()])),
            ..self.clone()
        }
    }

    pub fn sem_codigos(&self) -> FiltroSelecao {
        FiltroSelecao {
            codigos: Selecao::Todas,
            ..self.clone()
        }
    }
}

/// Aplica UF e depois unidades.
///
/// Um filtro ativo sobre coluna não resolvida não encontra nenhuma linha.
pub fn filtrar_por_local<'a>(
    linhas: &'a [Linha],
    colunas: &ColunasResolvidas,
    filtro: &FiltroSelecao,
) -> Vec<&'a Linha> {
    if (!filtro.uf.is_todas() && colunas.uf.is_none())
        || (!filtro.unidades.is_todas() && colunas.unidade.is_none())
    {
        return Vec::new();
    }

    linhas
        .iter()
        .filter(|l| filtro.uf.aceita(l.campo_opcional(colunas.uf.as_ref())))
        .filter(|l| filtro.unidades.aceita(l.campo_opcional(colunas.unidade.as_ref())))
        .collect()
}

/// UF, unidades e por fim códigos. `Todas` nos códigos mantém linhas sem código.
pub fn filtrar<'a>(
    linhas: &'a [Linha],
    colunas: &ColunasResolvidas,
    filtro: &FiltroSelecao,
) -> Vec<&'a Linha> {
    let locais = filtrar_por_local(linhas, colunas, filtro);
    if filtro.codigos.is_todas() {
        return locais;
    }
    let Some(ocorrencia) = colunas.ocorrencia.as_ref() else {
        return Vec::new();
    };
    locais
        .into_iter()
        .filter(|l| filtro.codigos.aceita(l.campo(ocorrencia)))
        .collect()
}

/// Códigos pré-selecionados: os padrões disponíveis ou, na falta deles,
/// o primeiro disponível.
///
/// ```
/// use analise_ocorrencias::selecao_padrao_de_codigos;
///
/// assert_eq!(selecao_padrao_de_codigos(&["999", "59", "1"]), ["1", "59"]);
/// assert_eq!(selecao_padrao_de_codigos(&["999", "998"]), ["999"]);
/// assert!(selecao_padrao_de_codigos::<&str>(&[]).is_empty());
/// ```
pub fn selecao_padrao_de_codigos<S: AsRef<str>>(disponiveis: &[S]) -> Vec<String> {
    let padrao: Vec<String> = CODIGOS_SELECIONADOS_PADRAO
        .iter()
        .filter(|c| disponiveis.iter().any(|d| d.as_ref() == **c))
        .map(|c| c.to_string())
        .collect();

    if !padrao.is_empty() {
        return padrao;
    }
    disponiveis
        .first()
        .map(|c| vec![c.as_ref().to_string()])
        .unwrap_or_default()
}

/// Unidades da UF escolhida (ou de todas as UFs), filtradas por trecho do nome
/// sem distinção de maiúsculas.
pub fn buscar_unidades(meta: &ResultadoAgregacao, uf: &Selecao<String>, termo: &str) -> Vec<String> {
    let termo = termo.trim().to_lowercase();

    let unidades: BTreeSet<&String> = match uf {
        Selecao::Todas => meta.ufs_unidades.values().flatten().collect(),
        Selecao::Apenas(uf) => meta.ufs_unidades.get(uf).into_iter().flatten().collect(),
    };

    unidades
        .into_iter()
        .filter(|u| termo.is_empty() || u.to_lowercase().contains(&termo))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{COLUNA_ALVO, Cabecalho};
    use std::sync::Arc;

    fn dados() -> (Vec<Linha>, ColunasResolvidas) {
        let cab = Arc::new(Cabecalho::new(["UF de Entrega", "Unidade Receptora", COLUNA_ALVO]));
        let linhas = [
            ["SP", "ABC", "1"],
            ["SP", "XYZ", "59"],
            ["RJ", "ABC", "26"],
            ["SP", "ABC", ""],
        ]
        .iter()
        .map(|v| Linha::new(cab.clone(), v.iter().map(|s| s.to_string()).collect()))
        .collect();
        let colunas = ColunasResolvidas::resolver(cab.nomes());
        (linhas, colunas)
    }

    #[test]
    fn uf_unidade_e_codigo_combinados() {
        let (linhas, colunas) = dados();
        let filtro = FiltroSelecao {
            uf: Selecao::Apenas("SP".into()),
            unidades: Selecao::from_lista(Some(["ABC"])),
            codigos: Selecao::Todas,
        };
        assert_eq!(filtrar(&linhas, &colunas, &filtro).len(), 2);

        let filtro = FiltroSelecao {
            codigos: Selecao::from_lista(Some(["1", "26"])),
            ..filtro
        };
        assert_eq!(filtrar(&linhas, &colunas, &filtro).len(), 1);
    }

    #[test]
    fn coluna_ausente_resulta_em_lista_vazia() {
        let (linhas, mut colunas) = dados();
        colunas.uf = None;
        let filtro = FiltroSelecao {
            uf: Selecao::Apenas("SP".into()),
            ..Default::default()
        };
        assert!(filtrar(&linhas, &colunas, &filtro).is_empty());
        // Sem filtro de UF a coluna não é necessária
        assert_eq!(filtrar(&linhas, &colunas, &FiltroSelecao::default()).len(), 4);
    }

    #[test]
    fn busca_de_unidades() {
        let mut meta = ResultadoAgregacao::default();
        meta.ufs_unidades.insert("SC".into(), BTreeSet::from(["BLU".into(), "BNU".into()]));
        meta.ufs_unidades.insert("PR".into(), BTreeSet::from(["CRC".into()]));

        assert_eq!(buscar_unidades(&meta, &Selecao::Todas, "b"), ["BLU", "BNU"]);
        assert_eq!(buscar_unidades(&meta, &Selecao::Apenas("PR".into()), ""), ["CRC"]);
        assert!(buscar_unidades(&meta, &Selecao::Apenas("RS".into()), "").is_empty());
    }
}
