//! Consultas externas: prazo ideal por cidade/unidade e nome do motorista por placa.
//!
//! As métricas dependem apenas dos traits. As tabelas em CSV são uma implementação
//! de conveniência para a linha de comando; closures também servem.

use std::{collections::HashMap, fs::File, io::BufReader, path::Path};
use tracing::{debug, info};

use crate::{AnaliseError, AnaliseResult, MOTORISTA_NAO_ENCONTRADO, normalizar};

/// Prazo ideal de entrega, em dias úteis, para uma cidade atendida por uma unidade.
pub trait ConsultaPrazo {
    fn prazo_por_cidade(&self, cidade: &str, unidade: &str) -> Option<u32>;
}

/// Nome do motorista responsável pela placa.
/// Retorna [`MOTORISTA_NAO_ENCONTRADO`] em vez de falhar.
pub trait ConsultaMotorista {
    fn nome_motorista(&self, placa: &str, unidade: &str) -> String;
}

impl<F> ConsultaPrazo for F
where
    F: Fn(&str, &str) -> Option<u32>,
{
    fn prazo_por_cidade(&self, cidade: &str, unidade: &str) -> Option<u32> {
        self(cidade, unidade)
    }
}

impl<F> ConsultaMotorista for F
where
    F: Fn(&str, &str) -> String,
{
    fn nome_motorista(&self, placa: &str, unidade: &str) -> String {
        self(placa, unidade)
    }
}

/// Prazos carregados de um CSV `cidade;unidade;prazo`.
///
/// ```
/// use analise_ocorrencias::{ConsultaPrazo, TabelaPrazos};
///
/// let tabela = TabelaPrazos::from_reader("cidade;unidade;prazo\nSão José;BLU;2\n".as_bytes()).unwrap();
/// assert_eq!(tabela.prazo_por_cidade("SAO JOSE", "blu"), Some(2));
/// assert_eq!(tabela.prazo_por_cidade("Joinville", "BLU"), None);
/// ```
#[derive(Debug, Clone, Default)]
pub struct TabelaPrazos {
    prazos: HashMap<(String, String), u32>,
}

impl TabelaPrazos {
    pub fn from_path(path: &Path) -> AnaliseResult<Self> {
        let file = File::open(path).map_err(|e| AnaliseError::IoReader {
            source: e,
            arquivo: path.to_path_buf(),
        })?;
        let tabela = Self::from_reader(BufReader::new(file))?;
        info!(arquivo = %path.display(), entradas = tabela.len(), "tabela de prazos carregada");
        Ok(tabela)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> AnaliseResult<Self> {
        let mut tabela = TabelaPrazos::default();
        for (idx, registro) in leitor_tabela(reader).records().enumerate() {
            let registro = registro.map_err(|e| AnaliseError::from_csv(e, "tabela de prazos", idx + 2))?;
            let (Some(cidade), Some(unidade), Some(prazo)) =
                (registro.get(0), registro.get(1), registro.get(2))
            else {
                continue;
            };
            let Ok(prazo) = prazo.parse::<u32>() else {
                debug!(cidade, unidade, prazo, "prazo ilegível ignorado");
                continue;
            };
            tabela.inserir(cidade, unidade, prazo);
        }
        Ok(tabela)
    }

    pub fn inserir(&mut self, cidade: &str, unidade: &str, prazo: u32) {
        self.prazos.insert((normalizar(cidade), normalizar(unidade)), prazo);
    }

    pub fn len(&self) -> usize {
        self.prazos.len()
    }

    pub fn is_empty(&self) -> bool {
        self.prazos.is_empty()
    }
}

impl ConsultaPrazo for TabelaPrazos {
    fn prazo_por_cidade(&self, cidade: &str, unidade: &str) -> Option<u32> {
        self.prazos
            .get(&(normalizar(cidade), normalizar(unidade)))
            .copied()
    }
}

/// Diretório de motoristas carregado de um CSV `placa;unidade;motorista`.
///
/// Procura primeiro o par (placa, unidade) e depois apenas a placa.
#[derive(Debug, Clone, Default)]
pub struct DiretorioMotoristas {
    por_placa_unidade: HashMap<(String, String), String>,
    por_placa: HashMap<String, String>,
}

impl DiretorioMotoristas {
    pub fn from_path(path: &Path) -> AnaliseResult<Self> {
        let file = File::open(path).map_err(|e| AnaliseError::IoReader {
            source: e,
            arquivo: path.to_path_buf(),
        })?;
        let diretorio = Self::from_reader(BufReader::new(file))?;
        info!(arquivo = %path.display(), placas = diretorio.por_placa.len(), "diretório de motoristas carregado");
        Ok(diretorio)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> AnaliseResult<Self> {
        let mut diretorio = DiretorioMotoristas::default();
        for (idx, registro) in leitor_tabela(reader).records().enumerate() {
            let registro =
                registro.map_err(|e| AnaliseError::from_csv(e, "diretório de motoristas", idx + 2))?;
            if let (Some(placa), Some(unidade), Some(motorista)) =
                (registro.get(0), registro.get(1), registro.get(2))
                && !placa.is_empty()
                && !motorista.is_empty()
            {
                diretorio.inserir(placa, unidade, motorista);
            }
        }
        Ok(diretorio)
    }

    pub fn inserir(&mut self, placa: &str, unidade: &str, motorista: &str) {
        let placa = normalizar_placa(placa);
        self.por_placa_unidade
            .insert((placa.clone(), normalizar(unidade)), motorista.to_string());
        self.por_placa.entry(placa).or_insert_with(|| motorista.to_string());
    }
}

impl ConsultaMotorista for DiretorioMotoristas {
    fn nome_motorista(&self, placa: &str, unidade: &str) -> String {
        let placa = normalizar_placa(placa);
        self.por_placa_unidade
            .get(&(placa.clone(), normalizar(unidade)))
            .or_else(|| self.por_placa.get(&placa))
            .cloned()
            .unwrap_or_else(|| MOTORISTA_NAO_ENCONTRADO.to_string())
    }
}

/// Placas comparadas sem hífen, espaços e caixa (`abc-1d23` == `ABC1D23`).
fn normalizar_placa(placa: &str) -> String {
    placa
        .chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

fn leitor_tabela<R: std::io::Read>(reader: R) -> csv::Reader<R> {
    csv::ReaderBuilder::new()
        .delimiter(b';')
        .has_headers(true)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn closures_servem_como_consulta() {
        let prazo = |cidade: &str, _unidade: &str| (cidade == "Blumenau").then_some(1u32);
        assert_eq!(prazo.prazo_por_cidade("Blumenau", "BLU"), Some(1));
        assert_eq!(prazo.prazo_por_cidade("Gaspar", "BLU"), None);

        let motorista = |placa: &str, _: &str| format!("Motorista {placa}");
        assert_eq!(motorista.nome_motorista("ABC1234", "X"), "Motorista ABC1234");
    }

    #[test]
    fn diretorio_prefere_par_placa_unidade() {
        let csv = "placa;unidade;motorista\nABC-1D23;BLU;Fulano\nabc1d23;JCA;Beltrano\n";
        let dir = DiretorioMotoristas::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(dir.nome_motorista("ABC1D23", "JCA"), "Beltrano");
        assert_eq!(dir.nome_motorista("ABC1D23", "BLU"), "Fulano");
        // Unidade desconhecida: primeiro motorista cadastrado para a placa
        assert_eq!(dir.nome_motorista("abc 1d23", "XXX"), "Fulano");
        assert_eq!(dir.nome_motorista("ZZZ9999", "BLU"), MOTORISTA_NAO_ENCONTRADO);
    }

    #[test]
    fn prazo_ilegivel_e_ignorado() {
        let csv = "cidade;unidade;prazo\nGaspar;BLU;x\nIlhota;BLU;0\n";
        let tabela = TabelaPrazos::from_reader(csv.as_bytes()).unwrap();
        assert_eq!(tabela.len(), 1);
        assert_eq!(tabela.prazo_por_cidade("Ilhota", "BLU"), Some(0));
    }
}
